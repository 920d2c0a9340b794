//! # Platform-specific utilities
//!
//! Questo modulo centralizza la logica cross-platform per i comandi esterni:
//! nomi eseguibili, risoluzione dei path (bundled o di sistema) e il sink
//! di output nullo usato dal primo pass video.

use crate::tool_resolver::ToolPathResolver;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Platform-specific command manager with tool resolution
pub struct PlatformCommands {
    tool_resolver: ToolPathResolver,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(|| Self {
            tool_resolver: ToolPathResolver::new(),
        })
    }

    /// Get the platform-specific command name
    pub fn get_command(&self, base_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", base_name)
        } else {
            base_name.to_string()
        }
    }

    /// Null output target for ffmpeg (`-f null <sink>`)
    pub fn null_sink(&self) -> &'static str {
        if cfg!(windows) {
            "NUL"
        } else {
            "/dev/null"
        }
    }

    /// Check if a command is available on the system or bundled
    pub fn is_command_available(&self, base_name: &str) -> bool {
        self.tool_resolver.is_tool_available(base_name)
    }

    /// Get the resolved path to a tool (bundled or system)
    pub fn get_tool_path(&self, base_name: &str) -> Option<PathBuf> {
        self.tool_resolver.resolve_tool(base_name)
    }

    /// Pick the binary to run: explicit override, resolved path, or bare command name
    pub fn command_path(&self, base_name: &str, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        self.get_tool_path(base_name)
            .unwrap_or_else(|| PathBuf::from(self.get_command(base_name)))
    }

    /// Get a report of all available tools
    pub fn get_tools_report(&self) -> String {
        self.tool_resolver.get_tools_report()
    }
}
