//! Output key generation
//!
//! Keys are a pure function of (source key, width, format) so that re-running a job
//! overwrites the same objects instead of creating new ones.

use crate::models::{OutputFormat, TargetWidth};

/// Build the object key of a variant
///
/// `photos/vacation.jpg` at 700 px WebP becomes `photos/vacation-700w.webp`; the
/// original-width, format-preserving variant keeps the source key.
pub fn output_key(
    original_key: &str,
    target_width: TargetWidth,
    output_format: OutputFormat,
) -> String {
    let (directory, file_name) = match original_key.rfind('/') {
        Some(index) => (&original_key[..index], &original_key[index + 1..]),
        None => ("", original_key),
    };

    let (base_name, original_extension) = match file_name.rfind('.') {
        Some(index) if index > 0 => (&file_name[..index], &file_name[index..]),
        _ => (file_name, ""),
    };

    let suffix = match target_width {
        TargetWidth::Original => String::new(),
        TargetWidth::Pixels(px) => format!("-{px}w"),
    };

    let extension = match output_format {
        OutputFormat::OriginalPreserving => original_extension,
        OutputFormat::Webp => ".webp",
    };

    let file = format!("{base_name}{suffix}{extension}");
    let joined = if directory.is_empty() {
        file
    } else {
        format!("{directory}/{file}")
    };

    match joined.strip_prefix("./") {
        Some(stripped) => stripped.to_string(),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacation_keys() {
        let key = "photos/vacation.jpg";
        assert_eq!(
            output_key(key, TargetWidth::Pixels(700), OutputFormat::Webp),
            "photos/vacation-700w.webp"
        );
        assert_eq!(
            output_key(key, TargetWidth::Pixels(1400), OutputFormat::OriginalPreserving),
            "photos/vacation-1400w.jpg"
        );
        assert_eq!(
            output_key(key, TargetWidth::Original, OutputFormat::Webp),
            "photos/vacation.webp"
        );
        assert_eq!(
            output_key(key, TargetWidth::Original, OutputFormat::OriginalPreserving),
            "photos/vacation.jpg"
        );
    }

    #[test]
    fn test_root_level_keys_have_no_directory_artifact() {
        assert_eq!(
            output_key("a.png", TargetWidth::Pixels(700), OutputFormat::Webp),
            "a-700w.webp"
        );
        assert_eq!(
            output_key("./a.png", TargetWidth::Pixels(700), OutputFormat::OriginalPreserving),
            "a-700w.png"
        );
    }

    #[test]
    fn test_only_final_extension_is_replaced() {
        assert_eq!(
            output_key("x/archive.tar.jpeg", TargetWidth::Pixels(10), OutputFormat::Webp),
            "x/archive.tar-10w.webp"
        );
        assert_eq!(
            output_key("x/Photo.JPG", TargetWidth::Pixels(10), OutputFormat::OriginalPreserving),
            "x/Photo-10w.JPG"
        );
    }

    #[test]
    fn test_deterministic() {
        let first = output_key("a/b/c.tiff", TargetWidth::Pixels(1400), OutputFormat::Webp);
        let second = output_key("a/b/c.tiff", TargetWidth::Pixels(1400), OutputFormat::Webp);
        assert_eq!(first, second);
    }
}
