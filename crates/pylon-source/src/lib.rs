//! Breakpoint-scope source analysis for Python targets.
//!
//! Answers the debuggee's "which exception handlers cover this file?"
//! queries: every `try` statement is reported as a line range over its
//! protected body together with the exception types its handlers catch
//! (`"*"` for a catch-all). The query is best-effort by contract — any
//! I/O or parse failure yields an empty result rather than an error.

use std::cell::RefCell;
use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Result<Parser, String>> = RefCell::new({
        let mut parser = Parser::new();
        match parser.set_language(tree_sitter_python::language()) {
            Ok(()) => Ok(parser),
            Err(_) => Err("tree-sitter-python language load failed".to_string()),
        }
    });
}

/// Catch-all marker: a bare `except:` or a `try`/`finally` with no handlers
/// catches everything, so per-type entries would be redundant.
pub const ANY_EXCEPTION: &str = "*";

/// The handler coverage of one `try` statement.
///
/// Lines are 1-based. `end_line` is the line *after* the last line of the
/// protected body — the handlers themselves are not part of the range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerRange {
    pub start_line: i32,
    pub end_line: i32,
    /// Dotted exception-type names, or exactly `["*"]` for a catch-all.
    pub handlers: Vec<String>,
}

/// Parse a Python source file and report its exception-handler ranges.
///
/// Missing or unreadable files produce an empty list.
pub fn handled_exception_ranges_for_file(path: &Path) -> Vec<HandlerRange> {
    match std::fs::read_to_string(path) {
        Ok(source) => handled_exception_ranges(&source),
        Err(err) => {
            tracing::debug!(
                target = "pylon.source",
                path = %path.display(),
                error = %err,
                "failed to read source for handler ranges"
            );
            Vec::new()
        }
    }
}

pub fn handled_exception_ranges(source: &str) -> Vec<HandlerRange> {
    let tree = match parse_python(source) {
        Ok(tree) => tree,
        Err(err) => {
            tracing::debug!(target = "pylon.source", error = %err, "parse failed");
            return Vec::new();
        }
    };

    let mut ranges = Vec::new();
    visit_nodes(tree.root_node(), &mut |node| {
        if node.kind() == "try_statement" {
            if let Some(range) = try_statement_range(node, source) {
                ranges.push(range);
            }
        }
    });
    ranges
}

/// Parse Python source text with `tree-sitter-python`.
fn parse_python(source: &str) -> Result<Tree, String> {
    PYTHON_PARSER.with(|parser_cell| {
        let mut parser = parser_cell
            .try_borrow_mut()
            .map_err(|_| "tree-sitter parser is already in use".to_string())?;
        let parser = match parser.as_mut() {
            Ok(parser) => parser,
            Err(err) => return Err(err.clone()),
        };

        parser
            .parse(source, None)
            .ok_or_else(|| "tree-sitter failed to produce a syntax tree".to_string())
    })
}

/// Visit a node and all its descendants in pre-order.
fn visit_nodes<'a, F: FnMut(Node<'a>)>(node: Node<'a>, f: &mut F) {
    f(node);
    if node.child_count() == 0 {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit_nodes(child, f);
    }
}

fn try_statement_range(node: Node<'_>, source: &str) -> Option<HandlerRange> {
    let body = node.child_by_field_name("body")?;
    let start_line = node.start_position().row as i32 + 1;
    // Line after the last line of the protected body (rows are 0-based).
    let end_line = body.end_position().row as i32 + 2;

    let mut handlers = Vec::new();
    let mut saw_except = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "except_clause" {
            continue;
        }
        saw_except = true;

        match handler_filter(child) {
            // Bare `except:` collapses the whole list; remaining handler
            // types are not recorded.
            None => {
                handlers.clear();
                handlers.push(ANY_EXCEPTION.to_string());
                break;
            }
            Some(filter) => collect_handler_names(filter, source, &mut handlers),
        }
    }

    // `try`/`finally` with no handlers behaves like a catch-all range.
    if !saw_except {
        handlers.push(ANY_EXCEPTION.to_string());
    }

    if handlers.is_empty() {
        return None;
    }

    Some(HandlerRange {
        start_line,
        end_line,
        handlers,
    })
}

/// The exception-type expression of an `except` clause, if it has one.
///
/// The clause's named children are the filter expression, an optional
/// alias, and the suite; only the first non-block child matters here.
fn handler_filter(clause: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = clause.walk();
    let filter = clause
        .named_children(&mut cursor)
        .find(|child| !matches!(child.kind(), "block" | "comment"));
    filter
}

fn collect_handler_names(expr: Node<'_>, source: &str, out: &mut Vec<String>) {
    // `except E as e:` wraps the type expression in an as_pattern whose
    // first named child is the expression itself.
    let expr = if expr.kind() == "as_pattern" {
        match expr.named_child(0) {
            Some(inner) => inner,
            None => return,
        }
    } else {
        expr
    };
    match expr.kind() {
        "tuple" => {
            let mut cursor = expr.walk();
            for item in expr.named_children(&mut cursor) {
                if let Some(name) = to_dotted_name(item, source) {
                    out.push(name);
                }
            }
        }
        _ => {
            if let Some(name) = to_dotted_name(expr, source) {
                out.push(name);
            }
        }
    }
}

/// Reduce an expression to a dotted name where statically resolvable: a
/// plain identifier, or attribute access whose base chain bottoms out in an
/// identifier. Anything else (calls, subscripts, ...) is skipped.
fn to_dotted_name(expr: Node<'_>, source: &str) -> Option<String> {
    match expr.kind() {
        "identifier" => Some(node_text(source, expr).to_string()),
        "attribute" => {
            let mut target = expr.child_by_field_name("object")?;
            while target.kind() == "attribute" {
                target = target.child_by_field_name("object")?;
            }
            if target.kind() == "identifier" {
                Some(node_text(source, expr).to_string())
            } else {
                None
            }
        }
        "parenthesized_expression" | "as_pattern" => {
            let mut cursor = expr.walk();
            let inner = expr
                .named_children(&mut cursor)
                .find(|child| child.kind() != "comment")?;
            to_dotted_name(inner, source)
        }
        _ => None,
    }
}

/// Return the byte slice for `node` within `source`.
fn node_text<'a>(source: &'a str, node: Node<'_>) -> &'a str {
    &source[node.byte_range()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ranges(source: &str) -> Vec<HandlerRange> {
        handled_exception_ranges(source)
    }

    #[test]
    fn typed_handler() {
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             \x20   y = 2\n\
             except ValueError:\n\
             \x20   pass\n",
        );
        assert_eq!(
            found,
            vec![HandlerRange {
                start_line: 1,
                end_line: 4,
                handlers: vec!["ValueError".to_string()],
            }]
        );
    }

    #[test]
    fn bare_except_collapses_to_star() {
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             except ValueError:\n\
             \x20   pass\n\
             except:\n\
             \x20   pass\n",
        );
        assert_eq!(found[0].handlers, vec!["*".to_string()]);
    }

    #[test]
    fn try_finally_without_handlers_is_catch_all() {
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             finally:\n\
             \x20   pass\n",
        );
        assert_eq!(found[0].handlers, vec!["*".to_string()]);
    }

    #[test]
    fn tuple_of_types_records_each() {
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             except (ValueError, os.error):\n\
             \x20   pass\n",
        );
        assert_eq!(
            found[0].handlers,
            vec!["ValueError".to_string(), "os.error".to_string()]
        );
    }

    #[test]
    fn dotted_name_and_alias() {
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             except socket.timeout as err:\n\
             \x20   pass\n",
        );
        assert_eq!(found[0].handlers, vec!["socket.timeout".to_string()]);
    }

    #[test]
    fn aliased_tuple_records_each() {
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             except (ValueError, os.error) as err:\n\
             \x20   pass\n",
        );
        assert_eq!(
            found[0].handlers,
            vec!["ValueError".to_string(), "os.error".to_string()]
        );
    }

    #[test]
    fn irreducible_expression_is_skipped() {
        // A call expression can't be statically reduced to a dotted name;
        // with no usable handlers the range is dropped entirely.
        let found = ranges(
            "try:\n\
             \x20   x = 1\n\
             except get_error_type():\n\
             \x20   pass\n",
        );
        assert!(found.is_empty());
    }

    #[test]
    fn end_line_is_line_after_protected_body() {
        let found = ranges(
            "def f():\n\
             \x20   try:\n\
             \x20       a = 1\n\
             \x20       b = 2\n\
             \x20   except KeyError:\n\
             \x20       pass\n",
        );
        assert_eq!(found[0].start_line, 2);
        assert_eq!(found[0].end_line, 5);
    }

    #[test]
    fn nested_tries_all_reported() {
        let found = ranges(
            "try:\n\
             \x20   try:\n\
             \x20       x = 1\n\
             \x20   except KeyError:\n\
             \x20       pass\n\
             except ValueError:\n\
             \x20   pass\n",
        );
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn missing_file_yields_empty() {
        let found = handled_exception_ranges_for_file(Path::new("/no/such/file.py"));
        assert!(found.is_empty());
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "try:\n    x = 1\nexcept OSError:\n    pass\n").unwrap();
        let found = handled_exception_ranges_for_file(file.path());
        assert_eq!(found[0].handlers, vec!["OSError".to_string()]);
    }
}
