//! Classification of uploaded files by declared MIME type

/// The closed set of inputs the merge pipeline knows how to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Png,
    Jpeg,
    Pdf,
    Unsupported(String),
}

impl FileKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "image/png" => FileKind::Png,
            "image/jpeg" | "image/jpg" => FileKind::Jpeg,
            "application/pdf" => FileKind::Pdf,
            other => FileKind::Unsupported(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_mime_types() {
        assert_eq!(FileKind::from_mime("image/png"), FileKind::Png);
        assert_eq!(FileKind::from_mime("image/jpeg"), FileKind::Jpeg);
        assert_eq!(FileKind::from_mime("image/jpg"), FileKind::Jpeg);
        assert_eq!(FileKind::from_mime("application/pdf"), FileKind::Pdf);
    }

    #[test]
    fn test_unknown_mime_type_is_kept() {
        assert_eq!(
            FileKind::from_mime("image/gif"),
            FileKind::Unsupported("image/gif".to_string())
        );
        assert_eq!(FileKind::from_mime(""), FileKind::Unsupported(String::new()));
    }
}
