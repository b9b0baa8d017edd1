//! Image reference sanitization.
//!
//! Turns an image reference like `registry/name:tag` into a filesystem-safe
//! slug like `registry_name_tag`. Pure and deterministic: callers rely on the
//! same reference always producing the same slug across runs.

/// Replaces every `/` with `_`, then every `:` with `_`. Order matters: a
/// reference containing both separators must always resolve to the same
/// slug regardless of which character class happens to run first, so the
/// two substitution passes are applied in a fixed order rather than via a
/// single character-class match.
pub fn sanitize(image_ref: &str) -> String {
    image_ref.replace('/', "_").replace(':', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replaces_slashes_and_colons() {
        assert_eq!(sanitize("chainguard/wolfi-base"), "chainguard_wolfi-base");
        assert_eq!(sanitize("alpine:3.19"), "alpine_3.19");
        assert_eq!(
            sanitize("registry.example.com/org/image:tag"),
            "registry.example.com_org_image_tag"
        );
    }

    #[test]
    fn is_stable_and_idempotent_on_already_clean_input() {
        assert_eq!(sanitize("alpine"), "alpine");
        assert_eq!(sanitize(&sanitize("alpine")), sanitize("alpine"));
    }

    #[test]
    fn contains_no_path_separators_or_colons() {
        for image in ["a/b:c", "a:b/c", "a/b/c:d:e", "plain"] {
            let slug = sanitize(image);
            assert!(!slug.contains('/'));
            assert!(!slug.contains(':'));
        }
    }
}
