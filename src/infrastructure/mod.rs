/// Infrastructure layer modules
///
/// This layer provides concrete implementations for external system interactions:
/// - File system operations (manifest discovery, root workspace manifests)
/// - Process execution (spawning package scripts and shell commands)
pub mod filesystem;
pub mod process;

// Re-export commonly used types
pub use filesystem::{ManifestDiscovery, RootManifest};
pub use process::{CommandExecutor, ProcessRunner};
