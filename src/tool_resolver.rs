//! # Tool Path Resolver
//!
//! This module handles finding the external codec tools in different environments:
//! - A bundled tools directory (`SQUISH_TOOLS_DIR`, or `tools/` next to the executable)
//! - System-installed tools on `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a directory of bundled tools
pub const TOOLS_DIR_ENV: &str = "SQUISH_TOOLS_DIR";

/// Every external tool the engine may invoke
pub const KNOWN_TOOLS: [&str; 3] = ["ffmpeg", "ffprobe", "cwebp"];

/// Tool path resolver for bundled and system-installed binaries
pub struct ToolPathResolver {
    /// Directory where tools are bundled, if any
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a new path resolver
    pub fn new() -> Self {
        Self {
            tools_dir: Self::detect_bundled_tools_dir(),
        }
    }

    /// Create a resolver that only looks in `tools_dir` and then `PATH`
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Detect the bundled tools directory
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        // Strategy 1: explicit override
        if let Ok(tools_dir) = env::var(TOOLS_DIR_ENV) {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking {} environment variable: {:?}", TOOLS_DIR_ENV, tools_path);
            if tools_path.is_dir() {
                return Some(tools_path);
            }
        }

        // Strategy 2: tools/ shipped next to the executable
        let exe_path = env::current_exe().ok()?;
        let tools_path = exe_path.parent()?.join("tools");
        debug!("Checking bundled tools path: {:?}", tools_path);
        if tools_path.is_dir() {
            return Some(tools_path);
        }

        debug!("No bundled tools directory found, using system PATH only");
        None
    }

    /// Resolve the path to a specific tool: bundled first, then system PATH
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = tools_dir.join(Self::executable_name(tool_name));
            if bundled_path.is_file() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
        }

        let system_path = Self::find_in_system_path(tool_name);
        match system_path {
            Some(ref path) => debug!("Using system tool: {} -> {:?}", tool_name, path),
            None => debug!("Tool not found: {}", tool_name),
        }
        system_path
    }

    fn executable_name(tool_name: &str) -> String {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        format!("{}{}", tool_name, extension)
    }

    /// Find tool in system PATH
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = Self::executable_name(tool_name);
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Get a report of tool availability
    pub fn get_tools_report(&self) -> String {
        let mut report = String::from("Tool availability:\n");
        if let Some(ref dir) = self.tools_dir {
            report.push_str(&format!("  bundled tools dir: {}\n", dir.display()));
        }
        for tool in KNOWN_TOOLS {
            match self.resolve_tool(tool) {
                Some(path) => report.push_str(&format!("  ✅ {} -> {}\n", tool, path.display())),
                None => report.push_str(&format!("  ❌ {} (not found)\n", tool)),
            }
        }
        report
    }

    pub fn tools_dir(&self) -> Option<&Path> {
        self.tools_dir.as_deref()
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}
