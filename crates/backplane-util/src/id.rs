//! Short id generation for sandboxes and jobs.

use uuid::Uuid;

/// Generate a short prefixed identifier, e.g. `sbx-1f0a9c2b4d6e`.
pub fn short_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_shape() {
        let id = short_id("sbx");
        assert!(id.starts_with("sbx-"));
        assert_eq!(id.len(), "sbx-".len() + 12);
    }

    #[test]
    fn test_short_id_unique() {
        assert_ne!(short_id("sbx"), short_id("sbx"));
    }
}
