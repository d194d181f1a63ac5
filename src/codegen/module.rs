//! Final module assembly

use super::{Compiler, ALLOCATOR, MEMORY_PAGES};
use std::fmt::Write;

impl Compiler {
    /// Wrap the generated functions into a complete module
    pub(super) fn finish(self) -> String {
        let mut out = String::from("(module\n");

        for import in &self.imports {
            let _ = writeln!(out, "\t{}", import);
        }
        let _ = writeln!(out, "\t(memory (export \"memory\") {})", MEMORY_PAGES);
        for (offset, bytes) in self.strings.iter() {
            let _ = writeln!(out, "\t(data (i32.const {}) \"{}\\00\")", offset, escape_bytes(bytes));
        }
        let _ = writeln!(
            out,
            "\t(global $memoryTop (mut i32) (i32.const {}))",
            self.strings.size()
        );
        write_allocator(&mut out);

        for line in self.code.lines() {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(")\n");
        out
    }
}

/// Bump allocator: takes a word count, returns the old heap top
fn write_allocator(out: &mut String) {
    let _ = writeln!(
        out,
        "\t(func ${0} (export \"{0}\") (param $size i32) (result i32)",
        ALLOCATOR
    );
    for instr in [
        "global.get $memoryTop",
        "global.get $memoryTop",
        "local.get $size",
        "i32.const 4",
        "i32.mul",
        "i32.add",
        "global.set $memoryTop",
    ] {
        let _ = writeln!(out, "\t\t{}", instr);
    }
    out.push_str("\t)\n");
}

/// Render bytes for a data string; anything outside printable ASCII, and
/// the quote and backslash, becomes a `\hh` escape
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' | b'\\' => {
                let _ = write!(out, "\\{:02x}", b);
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:02x}", b);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile_ok, lines};
    use super::*;
    use proptest::prelude::*;

    /// Inverse of [`escape_bytes`], stopping at the terminator
    fn unescape(text: &str) -> Vec<u8> {
        let raw = text.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'\\' {
                let hex = std::str::from_utf8(&raw[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 3;
            } else {
                out.push(raw[i]);
                i += 1;
            }
        }
        out
    }

    /// `(offset, bytes including NUL)` of every data segment
    fn segments(wat: &str) -> Vec<(u32, Vec<u8>)> {
        lines(wat)
            .into_iter()
            .filter_map(|l| l.strip_prefix("(data (i32.const "))
            .map(|rest| {
                let (offset, rest) = rest.split_once(") \"").unwrap();
                let body = rest.strip_suffix("\")").unwrap();
                (offset.parse().unwrap(), unescape(body))
            })
            .collect()
    }

    #[test]
    fn test_module_layout() {
        let wat = compile_ok("extern func i32 now()\nfunc main() {\n let str s = \"hi\"\n}");
        let lines = lines(&wat);
        assert_eq!(lines[0], "(module");
        assert_eq!(lines[1], "(import \"std\" \"now\" (func $now (result i32)))");
        assert_eq!(lines[2], "(memory (export \"memory\") 1)");
        assert_eq!(lines[3], "(data (i32.const 0) \"hi\\00\")");
        assert_eq!(lines[4], "(global $memoryTop (mut i32) (i32.const 3))");
        assert_eq!(lines[5], "(func $malloc (export \"malloc\") (param $size i32) (result i32)");
        assert_eq!(lines.last(), Some(&")"));
    }

    #[test]
    fn test_empty_program() {
        let wat = compile_ok("");
        assert!(wat.contains("(global $memoryTop (mut i32) (i32.const 0))"));
        assert!(!wat.contains("(data"));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(escape_bytes(b"a\"b"), "a\\22b");
        assert_eq!(escape_bytes(b"\\"), "\\5c");
        assert_eq!(escape_bytes(b"x\ny"), "x\\0ay");
        assert_eq!(escape_bytes("é".as_bytes()), "\\c3\\a9");
    }

    #[test]
    fn test_newline_literal_is_one_byte() {
        let wat = compile_ok("func main() {\n let str s = \"a\\nb\"\n}");
        assert!(wat.contains("(data (i32.const 0) \"a\\0ab\\00\")"));
        assert!(wat.contains("(i32.const 4))"));
    }

    proptest! {
        #[test]
        fn data_segments_reproduce_literals(words in proptest::collection::vec("[a-zA-Z0-9 .,!?]{0,12}", 1..8)) {
            let body: String = words
                .iter()
                .enumerate()
                .map(|(i, w)| format!(" let str s{} = \"{}\"\n", i, w))
                .collect();
            let wat = compile_ok(&format!("func main() {{\n{}}}", body));

            let segments = segments(&wat);
            prop_assert_eq!(segments.len(), words.len());
            let mut expected = 0u32;
            for ((offset, bytes), word) in segments.iter().zip(&words) {
                prop_assert_eq!(*offset, expected);
                let mut want = word.as_bytes().to_vec();
                want.push(0);
                prop_assert_eq!(bytes, &want);
                expected += want.len() as u32;
            }
            let top = format!("(global $memoryTop (mut i32) (i32.const {}))", expected);
            prop_assert!(wat.contains(&top));
        }
    }
}
