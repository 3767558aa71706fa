//! Emission substrate
//!
//! A hierarchical, forkable text-buffer model. The driver and backends write
//! through [`Wr`] handles into an arena of buffer nodes owned by the
//! [`Emitter`]; nothing touches the filesystem until the whole compilation is
//! lowered. Forks are named insertion points: a fork created at a writer's
//! current tail is spliced there on flush no matter how much is written to
//! the parent afterwards, which is how imports and forward declarations are
//! backfilled.
//!
//! Writer lifecycle is `Open -> Sealed -> Flushed`. Sealing is idempotent and
//! per-node: a fork stays writable after its parent scope closes. Writing to
//! a sealed node poisons the emitter and turns into an internal error at
//! flush time, so backends never need to thread state checks through every
//! write.

use std::path::{Path, PathBuf};

use super::LowerError;

/// Handle to a writer node. Cheap to copy; only meaningful together with the
/// emitter that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Wr(usize);

/// Placement of a block's opening delimiter relative to its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraceStyle {
    /// `header {`
    SameLine,
    /// `header` newline `{`
    NextLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Sealed,
    Flushed,
}

#[derive(Debug)]
enum Piece {
    Text(String),
    Child(usize),
}

#[derive(Debug)]
enum NodeKind {
    /// Root of one output file.
    File { path: PathBuf },
    /// A named insertion point inside a parent writer.
    Fork,
    /// A delimited, indented block.
    Block {
        header: String,
        open: String,
        close: String,
        style: BraceStyle,
    },
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    pieces: Vec<Piece>,
    state: State,
}

/// One rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOut {
    pub path: PathBuf,
    pub contents: String,
}

/// The buffer arena. Owns all emission state for one compilation.
#[derive(Debug)]
pub struct Emitter {
    nodes: Vec<Node>,
    files: Vec<usize>,
    indent_unit: &'static str,
    poisoned: Option<String>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            nodes: Vec::new(),
            files: Vec::new(),
            indent_unit: "  ",
            poisoned: None,
        }
    }

    pub fn with_indent_unit(indent_unit: &'static str) -> Self {
        Emitter {
            indent_unit,
            ..Emitter::new()
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> usize {
        self.nodes.push(Node {
            kind,
            pieces: Vec::new(),
            state: State::Open,
        });
        self.nodes.len() - 1
    }

    /// Create a fresh writer bound to a pending output file.
    pub fn new_file(&mut self, path: impl Into<PathBuf>) -> Wr {
        let idx = self.push_node(NodeKind::File { path: path.into() });
        self.files.push(idx);
        Wr(idx)
    }

    /// Append text to the writer's local buffer.
    pub fn write(&mut self, w: Wr, text: &str) {
        if self.nodes[w.0].state != State::Open {
            self.poison(w, "write");
            return;
        }
        match self.nodes[w.0].pieces.last_mut() {
            Some(Piece::Text(buf)) => buf.push_str(text),
            _ => self.nodes[w.0].pieces.push(Piece::Text(text.to_string())),
        }
    }

    /// Append a full line.
    pub fn writeln(&mut self, w: Wr, line: &str) {
        self.write(w, line);
        self.write(w, "\n");
    }

    /// Append an empty line.
    pub fn blank(&mut self, w: Wr) {
        self.write(w, "\n");
    }

    /// Split the writer at its current tail. The returned writer's contents
    /// are spliced at this point on flush, before any later parent writes.
    /// The splice point never moves after creation.
    pub fn fork(&mut self, w: Wr) -> Wr {
        if self.nodes[w.0].state != State::Open {
            self.poison(w, "fork");
        }
        let idx = self.push_node(NodeKind::Fork);
        self.nodes[w.0].pieces.push(Piece::Child(idx));
        Wr(idx)
    }

    /// Write a header and return a child block writer. On flush the child's
    /// contents are framed between the delimiters, one indentation level
    /// deeper than the parent.
    pub fn new_block(
        &mut self,
        w: Wr,
        header: &str,
        open: &str,
        close: &str,
        style: BraceStyle,
    ) -> Wr {
        if self.nodes[w.0].state != State::Open {
            self.poison(w, "new_block");
        }
        let idx = self.push_node(NodeKind::Block {
            header: header.to_string(),
            open: open.to_string(),
            close: close.to_string(),
            style,
        });
        self.nodes[w.0].pieces.push(Piece::Child(idx));
        Wr(idx)
    }

    /// Close a scope. Idempotent, and commutes with fork operations: forks
    /// taken from this writer remain writable.
    pub fn seal(&mut self, w: Wr) {
        if self.nodes[w.0].state == State::Open {
            self.nodes[w.0].state = State::Sealed;
        }
    }

    fn poison(&mut self, w: Wr, op: &str) {
        if self.poisoned.is_none() {
            self.poisoned = Some(format!(
                "{} on writer {} in state {:?}",
                op, w.0, self.nodes[w.0].state
            ));
        }
    }

    /// Serialize all writers depth-first, splicing each child at its fork
    /// point, and return per-file contents. Remaining open writers are
    /// sealed first (flush is implicit at end-of-compilation).
    pub fn flush(mut self) -> Result<Vec<FileOut>, LowerError> {
        if let Some(detail) = self.poisoned.take() {
            return Err(LowerError::internal("emission substrate", detail));
        }
        for node in &mut self.nodes {
            if node.state == State::Open {
                node.state = State::Sealed;
            }
        }

        let mut outputs = Vec::with_capacity(self.files.len());
        for &file_idx in &self.files.clone() {
            let path = match &self.nodes[file_idx].kind {
                NodeKind::File { path } => path.clone(),
                _ => unreachable!("file roots are always File nodes"),
            };
            let mut contents = String::new();
            self.render(file_idx, 0, &mut true, &mut contents);
            outputs.push(FileOut { path, contents });
        }
        Ok(outputs)
    }

    fn indent(&self, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str(self.indent_unit);
        }
    }

    fn render(&mut self, idx: usize, depth: usize, at_line_start: &mut bool, out: &mut String) {
        self.nodes[idx].state = State::Flushed;

        let child_depth = match self.nodes[idx].kind {
            NodeKind::Block { .. } => depth + 1,
            _ => depth,
        };

        if let NodeKind::Block {
            header,
            open,
            style,
            ..
        } = &self.nodes[idx].kind
        {
            if *at_line_start {
                self.indent(depth, out);
            }
            out.push_str(header);
            if !open.is_empty() {
                match style {
                    BraceStyle::SameLine => {
                        out.push(' ');
                        out.push_str(open);
                    }
                    BraceStyle::NextLine => {
                        out.push('\n');
                        self.indent(depth, out);
                        out.push_str(open);
                    }
                }
            }
            out.push('\n');
            *at_line_start = true;
        }

        let pieces = std::mem::take(&mut self.nodes[idx].pieces);
        for piece in &pieces {
            match piece {
                Piece::Text(text) => {
                    for ch in text.chars() {
                        if ch == '\n' {
                            out.push('\n');
                            *at_line_start = true;
                        } else {
                            if *at_line_start {
                                self.indent(child_depth, out);
                                *at_line_start = false;
                            }
                            out.push(ch);
                        }
                    }
                }
                Piece::Child(child) => {
                    self.render(*child, child_depth, at_line_start, out);
                }
            }
        }
        self.nodes[idx].pieces = pieces;

        if let NodeKind::Block { close, .. } = &self.nodes[idx].kind {
            if !close.is_empty() {
                if !*at_line_start {
                    out.push('\n');
                }
                self.indent(depth, out);
                out.push_str(close);
                out.push('\n');
                *at_line_start = true;
            } else if !*at_line_start {
                out.push('\n');
                *at_line_start = true;
            }
        }
    }
}

/// Write every rendered file, atomically as a set: on any failure the files
/// written so far in this run are removed and nothing is presented.
pub fn write_all(outputs: &[FileOut], root: &Path) -> Result<Vec<PathBuf>, LowerError> {
    let mut written = Vec::with_capacity(outputs.len());
    for out in outputs {
        let full = root.join(&out.path);
        let result = (|| {
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, &out.contents)
        })();
        match result {
            Ok(()) => written.push(full),
            Err(err) => {
                for path in &written {
                    let _ = std::fs::remove_file(path);
                }
                return Err(LowerError::Io(err));
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_writes_in_order() {
        let mut em = Emitter::new();
        let f = em.new_file("out.txt");
        em.writeln(f, "one");
        em.writeln(f, "two");
        let outs = em.flush().unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].contents, "one\ntwo\n");
    }

    #[test]
    fn test_fork_splices_before_later_writes() {
        let mut em = Emitter::new();
        let f = em.new_file("out.txt");
        em.writeln(f, "header");
        let imports = em.fork(f);
        em.writeln(f, "body");
        // Backfill after the parent has moved on.
        em.writeln(imports, "import a");
        em.writeln(imports, "import b");
        let outs = em.flush().unwrap();
        assert_eq!(outs[0].contents, "header\nimport a\nimport b\nbody\n");
    }

    #[test]
    fn test_fork_splice_point_never_moves() {
        let mut em = Emitter::new();
        let f = em.new_file("out.txt");
        let first = em.fork(f);
        em.writeln(f, "middle");
        let second = em.fork(f);
        em.writeln(second, "2");
        em.writeln(first, "1");
        let outs = em.flush().unwrap();
        assert_eq!(outs[0].contents, "1\nmiddle\n2\n");
    }

    #[test]
    fn test_block_indents_structurally() {
        let mut em = Emitter::new();
        let f = em.new_file("out.java");
        let class = em.new_block(f, "class Foo", "{", "}", BraceStyle::SameLine);
        let method = em.new_block(class, "void run()", "{", "}", BraceStyle::SameLine);
        em.writeln(method, "go();");
        let outs = em.flush().unwrap();
        assert_eq!(
            outs[0].contents,
            "class Foo {\n  void run() {\n    go();\n  }\n}\n"
        );
    }

    #[test]
    fn test_next_line_brace_style() {
        let mut em = Emitter::new();
        let f = em.new_file("out.cpp");
        let ns = em.new_block(f, "namespace demo", "{", "}", BraceStyle::NextLine);
        em.writeln(ns, "int x = 0;");
        let outs = em.flush().unwrap();
        assert_eq!(outs[0].contents, "namespace demo\n{\n  int x = 0;\n}\n");
    }

    #[test]
    fn test_delimiterless_block() {
        let mut em = Emitter::new();
        let f = em.new_file("out.py");
        let def = em.new_block(f, "def go():", "", "", BraceStyle::SameLine);
        em.writeln(def, "return 1");
        let outs = em.flush().unwrap();
        assert_eq!(outs[0].contents, "def go():\n  return 1\n");
    }

    #[test]
    fn test_seal_is_idempotent_and_forks_stay_writable() {
        let mut em = Emitter::new();
        let f = em.new_file("out.txt");
        let fork = em.fork(f);
        em.writeln(f, "tail");
        em.seal(f);
        em.seal(f);
        em.writeln(fork, "spliced");
        let outs = em.flush().unwrap();
        assert_eq!(outs[0].contents, "spliced\ntail\n");
    }

    #[test]
    fn test_write_after_seal_is_internal_error() {
        let mut em = Emitter::new();
        let f = em.new_file("out.txt");
        em.seal(f);
        em.write(f, "too late");
        assert!(matches!(
            em.flush(),
            Err(LowerError::Internal { .. })
        ));
    }

    #[test]
    fn test_multiple_files_render_separately() {
        let mut em = Emitter::new();
        let a = em.new_file("a.txt");
        let b = em.new_file("b.txt");
        em.writeln(b, "bee");
        em.writeln(a, "ay");
        let outs = em.flush().unwrap();
        assert_eq!(outs[0].path, PathBuf::from("a.txt"));
        assert_eq!(outs[0].contents, "ay\n");
        assert_eq!(outs[1].contents, "bee\n");
    }

    #[test]
    fn test_flush_is_deterministic() {
        let build = || {
            let mut em = Emitter::new();
            let f = em.new_file("out.txt");
            let head = em.fork(f);
            let class = em.new_block(f, "class C", "{", "}", BraceStyle::SameLine);
            em.writeln(class, "int x;");
            em.writeln(head, "// banner");
            em.flush().unwrap()
        };
        assert_eq!(build(), build());
    }
}
