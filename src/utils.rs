//! # Utility Functions Module
//!
//! Small helpers for building external tool command lines and for the
//! arithmetic shared by the targeters.

/// Converts any iterable of string-like items to `Vec<String>`.
///
/// Used to build ffmpeg / cwebp argument lists without a `.to_string()`
/// on every element.
///
/// # Example
/// ```rust
/// use squishfile::utils::to_string_vec;
///
/// let bitrate = 480;
/// let args = to_string_vec(["-b:v", &format!("{}k", bitrate), "-an"]);
/// assert_eq!(args, vec!["-b:v", "480k", "-an"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Build an argument vector from mixed displayable values.
///
/// # Example
/// ```rust
/// use squishfile::args;
///
/// let pass = 1;
/// let args = args!["-pass", pass, "-f", "null"];
/// assert_eq!(args, vec!["-pass", "1", "-f", "null"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

/// `|actual - target| / target <= tolerance`
pub fn within_tolerance(actual: u64, target: u64, tolerance: f64) -> bool {
    if target == 0 {
        return actual == 0;
    }
    (actual as f64 - target as f64).abs() / target as f64 <= tolerance
}

/// Whole kilobytes, truncating, for human-readable diagnostics
pub fn whole_kb(bytes: u64) -> u64 {
    bytes / 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_vec_mixed_types() {
        let num = 42;
        let result = to_string_vec(["-q", &num.to_string(), "-quiet"]);
        assert_eq!(result, vec!["-q".to_string(), "42".to_string(), "-quiet".to_string()]);
    }

    #[test]
    fn test_to_string_vec_empty() {
        let result: Vec<String> = to_string_vec(Vec::<&str>::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_args_macro() {
        let bitrate = 128;
        let result = args!["-b:a", format!("{}k", bitrate), "-y"];
        assert_eq!(result, vec!["-b:a".to_string(), "128k".to_string(), "-y".to_string()]);
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(1050, 1000, 0.05));
        assert!(within_tolerance(950, 1000, 0.05));
        assert!(!within_tolerance(1051, 1000, 0.05));
        assert!(!within_tolerance(900, 1000, 0.05));
    }

    #[test]
    fn test_whole_kb() {
        assert_eq!(whole_kb(1023), 0);
        assert_eq!(whole_kb(2048), 2);
        assert_eq!(whole_kb(5000), 4);
    }
}
