// src/validator.rs

use crate::config::UploadConfig;
use crate::format::format_file_size;
use crate::models::FileDescriptor;
use std::fmt;

/// A single constraint a file fails to meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    SizeExceeded { limit: u64 },
    TypeNotAllowed { mime_type: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::SizeExceeded { limit } => {
                write!(f, "File size exceeds {} limit", format_file_size(*limit))
            }
            Violation::TypeNotAllowed { mime_type } => {
                write!(f, "File type {mime_type} is not allowed")
            }
        }
    }
}

/// Checks a file against the configured limits.
/// An empty result means the file is acceptable.
pub fn validate(file: &FileDescriptor, config: &UploadConfig) -> Vec<Violation> {
    let mut violations = Vec::new();
    if file.size > config.max_file_size {
        violations.push(Violation::SizeExceeded {
            limit: config.max_file_size,
        });
    }
    if !config.allowed_types.is_empty() && !config.allowed_types.contains(&file.mime_type) {
        violations.push(Violation::TypeNotAllowed {
            mime_type: file.mime_type.clone(),
        });
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig::new(1000, ["image/png"], 1)
    }

    #[test]
    fn accepts_file_within_limits() {
        let file = FileDescriptor::new("ok.png", 1000, "image/png");
        assert!(validate(&file, &config()).is_empty());
    }

    #[test]
    fn reports_size_with_formatted_limit() {
        let file = FileDescriptor::new("big.png", 2000, "image/png");
        let violations = validate(&file, &config());
        assert_eq!(violations, vec![Violation::SizeExceeded { limit: 1000 }]);
        assert_eq!(violations[0].to_string(), "File size exceeds 1000 Bytes limit");
    }

    #[test]
    fn reports_every_violation() {
        let file = FileDescriptor::new("big.exe", 5000, "application/x-msdownload");
        let violations = validate(&file, &config());
        assert_eq!(violations.len(), 2);
        assert_eq!(
            violations[1].to_string(),
            "File type application/x-msdownload is not allowed"
        );
    }

    #[test]
    fn empty_allow_list_accepts_any_type() {
        let config = UploadConfig::new(1000, Vec::<String>::new(), 1);
        let file = FileDescriptor::new("notes.bin", 10, "application/octet-stream");
        assert!(validate(&file, &config).is_empty());
    }
}
