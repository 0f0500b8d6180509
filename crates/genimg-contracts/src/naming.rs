use uuid::Uuid;

pub const IMAGE_EXTENSION: &str = "png";

const MAX_STEM_CHARS: usize = 64;
const FALLBACK_PREFIX_CHARS: usize = 12;
const KNOWN_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// Turn arbitrary model output into a filesystem-safe, extension-less stem.
///
/// Returns an empty string when nothing usable is left.
pub fn sanitize_stem(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|ch| ch == '"' || ch == '\'' || ch == '`');
    let without_ext = strip_known_extension(trimmed);

    let mut out = String::with_capacity(without_ext.len());
    let mut last_was_sep = false;
    for ch in without_ext.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    let stem = out.trim_matches('_');
    stem.chars()
        .take(MAX_STEM_CHARS)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

/// Deterministic stem from the prompt prefix plus a random suffix.
pub fn fallback_stem(prompt: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    fallback_stem_with_suffix(prompt, &suffix[..8])
}

pub fn fallback_stem_with_suffix(prompt: &str, suffix: &str) -> String {
    let prefix: String = prompt.trim().chars().take(FALLBACK_PREFIX_CHARS).collect();
    let prefix = sanitize_stem(&prefix);
    if prefix.is_empty() {
        format!("image_{suffix}")
    } else {
        format!("image_{prefix}_{suffix}")
    }
}

pub fn filename_for_stem(stem: &str) -> String {
    format!("{stem}.{IMAGE_EXTENSION}")
}

fn strip_known_extension(value: &str) -> &str {
    if let Some((base, ext)) = value.rsplit_once('.') {
        if KNOWN_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
        {
            return base;
        }
    }
    value
}
