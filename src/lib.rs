#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
use pyo3::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod ast;
pub mod error;
pub mod parser;
pub mod printer;
pub mod types;
pub mod value;

pub use ast::{Expression, Node, NodeId, NodeKind, Program};
pub use error::FormatError;
pub use parser::parse;
pub use printer::{format, print, Printer};
pub use types::{Diagnostic, FormatOptions};

/// Formats `text` with options given as JSON (`{"printWidth": 100}`).
/// Missing keys take their defaults.
pub fn format_text(text: &str, options_json: &str) -> Result<String, FormatError> {
    let options = FormatOptions::from_json(options_json)?;
    Ok(format(text, &options))
}

/// Parses `text` and serializes the tree, diagnostics included, as pretty JSON.
pub fn parse_to_json(text: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&parse(text))
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pyfunction]
#[pyo3(name = "format_text", signature = (text, print_width = 80))]
fn format_text_py(text: String, print_width: usize) -> PyResult<String> {
    let options = FormatOptions::with_print_width(print_width);
    options
        .validate()
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?;
    Ok(format(&text, &options))
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pyfunction]
fn parse_text(text: String) -> PyResult<String> {
    parse_to_json(&text)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string()))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn format_text_wasm(text: &str) -> String {
    format(text, &FormatOptions::default())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn format_text_with_options_wasm(text: &str, options_json: &str) -> Result<String, JsValue> {
    format_text(text, options_json).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn parse_text_wasm(text: &str) -> Result<String, JsValue> {
    parse_to_json(text).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pymodule]
fn deva_fmt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(format_text_py, m)?)?;
    m.add_function(wrap_pyfunction!(parse_text, m)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn fixture_paths() -> Vec<PathBuf> {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .expect("Failed to read fixtures directory")
            .map(|entry| entry.expect("Failed to read fixture entry").path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "deva"))
            .collect();
        paths.sort();
        paths
    }

    fn run_fixture(path: &Path) {
        let golden_path = format!("{}.golden", path.display());
        let input = fs::read_to_string(path).expect("Failed to read input");
        let golden = fs::read_to_string(&golden_path).expect("Failed to read golden");
        let options = FormatOptions::default();

        let once = format(&input, &options);
        if once != golden {
            for (i, (a, b)) in once.lines().zip(golden.lines()).enumerate() {
                if a != b {
                    println!("Mismatch at line {}", i + 1);
                    println!("Got: {:?}", a);
                    println!("Exp: {:?}", b);
                    break;
                }
            }
            assert_eq!(once, golden, "Mismatch in fixture {}", path.display());
        }

        let twice = format(&once, &options);
        assert_eq!(
            twice,
            once,
            "Formatting is not idempotent for {}",
            path.display()
        );

        let overlong = input
            .lines()
            .any(|line| line.chars().count() > options.print_width);
        if !overlong {
            assert_eq!(
                once.trim_end().lines().count(),
                input.trim_end().lines().count(),
                "Line count changed in fixture {}",
                path.display()
            );
        }

        let program = parse(&input);
        assert!(
            program.diagnostics().is_empty(),
            "Unexpected diagnostics in {}: {:?}",
            path.display(),
            program.diagnostics()
        );
    }

    #[test]
    fn test_fixtures() {
        let paths = fixture_paths();
        assert!(!paths.is_empty(), "No fixtures found");
        for path in paths {
            run_fixture(&path);
        }
    }

    #[test]
    fn fixtures_without_unknown_lines() {
        for path in fixture_paths() {
            let input = fs::read_to_string(&path).expect("Failed to read input");
            let program = parse(&input);
            let unknown: Vec<_> = program
                .nodes()
                .filter_map(|(_, node)| match &node.kind {
                    NodeKind::Unknown { value } => Some(value.clone()),
                    _ => None,
                })
                .collect();
            assert!(
                unknown.is_empty(),
                "Unrecognized lines in {}: {:?}",
                path.display(),
                unknown
            );
        }
    }

    #[test]
    fn format_text_reads_json_options() {
        let src = "let    x = {alpha: 1, beta: 2}\n";
        assert_eq!(format_text(src, "{}").unwrap(), "let x = {alpha: 1, beta: 2}\n");
        assert_eq!(format_text(src, r#"{"printWidth": 10}"#).unwrap(), src);
        assert!(matches!(
            format_text(src, r#"{"printWidth": 0}"#),
            Err(FormatError::InvalidPrintWidth)
        ));
    }

    #[test]
    fn parse_to_json_tags_nodes() {
        let json = parse_to_json("bpm 120\n.kick 1/4").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["body"], serde_json::json!([0, 1]));
        assert_eq!(value["nodes"][0]["type"], "BpmDeclaration");
        assert_eq!(value["nodes"][1]["type"], "Trigger");
        assert_eq!(value["nodes"][1]["duration"]["type"], "BeatDuration");
        assert_eq!(value["nodes"][1]["duration"]["value"], "1/4");
        assert_eq!(value["nodes"][1]["source"]["line"], 1);
        assert!(value.get("diagnostics").is_none());
    }

    #[test]
    fn parse_to_json_lists_diagnostics() {
        let json = parse_to_json("else:").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["diagnostics"][0]["kind"], "orphan_else");
        assert_eq!(value["diagnostics"][0]["line"], 1);
    }
}
