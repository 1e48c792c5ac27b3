use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphConfigError {
    #[error("failed to read graph config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("graph config syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("graph config declares no input_stream")]
    MissingInputStream,
    #[error("graph config declares no output_stream")]
    MissingOutputStream,
}

/// One node declaration: a calculator name plus free-form string options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub calculator: String,
    pub options: BTreeMap<String, String>,
}

impl NodeConfig {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Parsed graph configuration: one named input stream, one named output
/// stream, and the ordered node chain between them.
///
/// The config is a line-oriented text format:
///
/// ```text
/// input_stream: "input_video"
/// output_stream: "output_detections"
///
/// node {
///   calculator: "BlazeFaceCalculator"
///   model_path: "models/blazeface.onnx"
///   min_score: "0.5"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConfig {
    pub input_stream: String,
    pub output_stream: String,
    pub nodes: Vec<NodeConfig>,
}

impl GraphConfig {
    pub fn from_file(path: &Path) -> Result<Self, GraphConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| GraphConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loaded graph config from {}", path.display());
        Self::parse(&contents)
    }

    pub fn parse(text: &str) -> Result<Self, GraphConfigError> {
        let mut input_stream: Option<String> = None;
        let mut output_stream: Option<String> = None;
        let mut nodes = Vec::new();
        let mut current_node: Option<(usize, NodeConfig)> = None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if line == "node {" {
                if current_node.is_some() {
                    return Err(syntax(line_no, "nested node block"));
                }
                current_node = Some((
                    line_no,
                    NodeConfig {
                        calculator: String::new(),
                        options: BTreeMap::new(),
                    },
                ));
                continue;
            }

            if line == "}" {
                let (opened_at, node) = current_node
                    .take()
                    .ok_or_else(|| syntax(line_no, "unmatched closing brace"))?;
                if node.calculator.is_empty() {
                    return Err(syntax(opened_at, "node block without a calculator field"));
                }
                nodes.push(node);
                continue;
            }

            let (key, value) = parse_field(line, line_no)?;
            match (&mut current_node, key) {
                (Some((_, node)), "calculator") => node.calculator = value,
                (Some((_, node)), _) => {
                    node.options.insert(key.to_string(), value);
                }
                (None, "input_stream") => {
                    if input_stream.replace(value).is_some() {
                        return Err(syntax(line_no, "duplicate input_stream declaration"));
                    }
                }
                (None, "output_stream") => {
                    if output_stream.replace(value).is_some() {
                        return Err(syntax(line_no, "duplicate output_stream declaration"));
                    }
                }
                (None, other) => {
                    return Err(syntax(
                        line_no,
                        &format!("unexpected top-level field '{other}'"),
                    ));
                }
            }
        }

        if let Some((opened_at, _)) = current_node {
            return Err(syntax(opened_at, "unterminated node block"));
        }

        Ok(Self {
            input_stream: input_stream.ok_or(GraphConfigError::MissingInputStream)?,
            output_stream: output_stream.ok_or(GraphConfigError::MissingOutputStream)?,
            nodes,
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Parses `key: "value"`, requiring the quotes around the value.
fn parse_field(line: &str, line_no: usize) -> Result<(&str, String), GraphConfigError> {
    let (key, rest) = line
        .split_once(':')
        .ok_or_else(|| syntax(line_no, "expected 'key: \"value\"'"))?;
    let rest = rest.trim();
    let value = rest
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| syntax(line_no, "field value must be double-quoted"))?;
    Ok((key.trim(), value.to_string()))
}

fn syntax(line: usize, message: &str) -> GraphConfigError {
    GraphConfigError::Syntax {
        line,
        message: message.to_string(),
    }
}
