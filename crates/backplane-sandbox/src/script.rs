//! Inline script generation for the remote file protocol.
//!
//! Every file operation on a sandbox travels through the single `execute`
//! primitive as a small POSIX `sh` script. File content crosses the command
//! channel only as base64, so arbitrary user data never meets the remote
//! shell unescaped; structured failures come back as sentinel markers on
//! stdout that map onto the typed backend errors. Defining the protocol
//! here once means every provider transport inherits identical semantics.

use backplane_core::error::{BackendError, BackendResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) const NOT_FOUND: &str = "__BPX_ENOENT__";
pub(crate) const IS_DIRECTORY: &str = "__BPX_EISDIR__";
pub(crate) const OK: &str = "__BPX_OK__";

/// Quote a string as a single POSIX shell word.
pub(crate) fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Map a sentinel marker in command output to its typed error.
pub(crate) fn sentinel_error(path: &str, output: &str) -> Option<BackendError> {
    if output.contains(NOT_FOUND) {
        Some(BackendError::not_found(path))
    } else if output.contains(IS_DIRECTORY) {
        Some(BackendError::is_directory(path))
    } else {
        None
    }
}

/// Script printing a line window of a file as base64. Slicing happens
/// remotely so large files are not transferred for a small window.
pub(crate) fn read_script(physical: &str, offset: usize, limit: usize) -> String {
    let end = offset.saturating_add(limit);
    format!(
        "p={p}; if [ -d \"$p\" ]; then echo {IS_DIRECTORY}; exit 1; fi; \
         if [ ! -f \"$p\" ]; then echo {NOT_FOUND}; exit 1; fi; \
         awk 'NR > {offset} && NR <= {end}' \"$p\" | base64",
        p = sh_quote(physical),
    )
}

/// Script printing a whole file as base64.
pub(crate) fn cat_script(physical: &str) -> String {
    format!(
        "p={p}; if [ -d \"$p\" ]; then echo {IS_DIRECTORY}; exit 1; fi; \
         if [ ! -f \"$p\" ]; then echo {NOT_FOUND}; exit 1; fi; \
         base64 < \"$p\"",
        p = sh_quote(physical),
    )
}

/// Script writing base64-decoded content to a file via a temp-and-rename.
/// Prints `__BPX_OK__ 1` when the file was created, `__BPX_OK__ 0` when
/// overwritten.
pub(crate) fn write_script(physical: &str, content_b64: &str) -> String {
    format!(
        "p={p}; if [ -d \"$p\" ]; then echo {IS_DIRECTORY}; exit 1; fi; \
         if [ -f \"$p\" ]; then c=0; else c=1; fi; \
         mkdir -p \"$(dirname \"$p\")\" || exit 1; \
         printf %s {b64} | base64 -d > \"$p.tmp.$$\" && mv \"$p.tmp.$$\" \"$p\" || exit 1; \
         echo {OK} $c",
        p = sh_quote(physical),
        b64 = sh_quote(content_b64),
    )
}

/// Script removing a single file.
pub(crate) fn delete_script(physical: &str) -> String {
    format!(
        "p={p}; if [ -d \"$p\" ]; then echo {IS_DIRECTORY}; exit 1; fi; \
         if [ ! -f \"$p\" ]; then echo {NOT_FOUND}; exit 1; fi; \
         rm -f \"$p\"",
        p = sh_quote(physical),
    )
}

/// Script listing direct children as `kind<TAB>size<TAB>name` lines.
/// Nonexistent or non-directory paths produce no output.
pub(crate) fn list_script(physical: &str) -> String {
    format!(
        "p={p}; [ -d \"$p\" ] || exit 0; \
         for f in \"$p\"/* \"$p\"/.*; do \
           b=$(basename \"$f\"); \
           if [ \"$b\" = . ] || [ \"$b\" = .. ]; then continue; fi; \
           [ -e \"$f\" ] || continue; \
           if [ -d \"$f\" ]; then printf 'd\\t0\\t%s\\n' \"$b\"; \
           else printf 'f\\t%s\\t%s\\n' \"$(wc -c < \"$f\")\" \"$b\"; fi; \
         done",
        p = sh_quote(physical),
    )
}

/// Script searching file contents recursively as `path:line:text` lines.
/// `-H` forces the path prefix even when the target is a single file,
/// keeping the output parseable. A no-match result exits zero like a
/// match, so only real failures surface as errors.
pub(crate) fn grep_script(physical: &str, pattern: &str) -> String {
    format!(
        "p={p}; [ -e \"$p\" ] || exit 0; \
         grep -rnHIE -- {pat} \"$p\"; s=$?; [ $s -le 1 ] && exit 0; exit $s",
        p = sh_quote(physical),
        pat = sh_quote(pattern),
    )
}

/// Script printing every file path under a directory.
pub(crate) fn find_script(physical: &str) -> String {
    format!(
        "p={p}; [ -d \"$p\" ] || exit 0; find \"$p\" -type f",
        p = sh_quote(physical),
    )
}

/// Encode content for transmission through a command line.
pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 command output, tolerating the line wrapping most
/// `base64` implementations emit.
pub(crate) fn decode_base64(output: &str) -> BackendResult<Vec<u8>> {
    let compact: String = output.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| BackendError::exec_failed(format!("invalid base64 in remote output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sh_quote_plain() {
        assert_eq!(sh_quote("abc"), "'abc'");
    }

    #[test]
    fn test_sh_quote_metacharacters() {
        assert_eq!(sh_quote("a b;rm -rf /"), "'a b;rm -rf /'");
        assert_eq!(sh_quote("it's"), r#"'it'\''s'"#);
    }

    #[test]
    fn test_read_script_embeds_quoted_path() {
        let script = read_script("/work/my file.txt", 5, 10);
        assert!(script.contains("'/work/my file.txt'"));
        assert!(script.contains("NR > 5 && NR <= 15"));
    }

    #[test]
    fn test_write_script_content_is_opaque() {
        let b64 = encode_base64(b"echo $(dangerous); 'quotes'");
        let script = write_script("/work/f", &b64);
        assert!(!script.contains("dangerous"));
        assert!(script.contains(&b64));
    }

    #[test]
    fn test_sentinel_mapping() {
        assert!(matches!(
            sentinel_error("/f", "__BPX_ENOENT__\n"),
            Some(BackendError::NotFound { .. })
        ));
        assert!(matches!(
            sentinel_error("/f", "__BPX_EISDIR__\n"),
            Some(BackendError::IsDirectory { .. })
        ));
        assert!(sentinel_error("/f", "normal output").is_none());
    }

    #[test]
    fn test_base64_round_trip_with_wrapping() {
        let data = b"line one\nline two";
        let encoded = encode_base64(data);
        // Simulate the 76-column wrapping of a remote base64 binary
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_base64(&wrapped).unwrap(), data);
    }
}
