use itertools::Itertools;

/// The syntax tree of one rule expression, kept for diagnostics after the
/// truth value has been computed.
///
/// Plugin references record the display name; a reference to a plugin that
/// is not in the active set is remembered as [Expr::Missing] so diagnostics
/// can point at what is absent.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expr {
    Plugin(String),
    Missing(String),
    All(Vec<Expr>),
    Any(Vec<Expr>),
    Not(Vec<Expr>),
    Desc { pattern: String, name: String },
}

impl Expr {
    /// Renders the tree one node per line, nested operators indented two
    /// spaces per level, every line prefixed with `prefix`.
    pub fn pretty(&self, prefix: &str) -> String {
        let mut lines = Vec::new();
        self.write(0, &mut lines);
        lines.iter().map(|line| format!("{}{}", prefix, line)).join("\n")
    }

    fn write(&self, depth: usize, out: &mut Vec<String>) {
        let pad = "  ".repeat(depth);
        match self {
            Expr::Plugin(name) => out.push(format!("{}{}", pad, name)),
            Expr::Missing(name) => out.push(format!("{}MISSING({})", pad, name)),
            Expr::Desc { pattern, name } => {
                out.push(format!("{}[DESC /{}/ {}]", pad, pattern, name));
            }
            Expr::All(args) => Self::write_op("ALL", args, depth, out),
            Expr::Any(args) => Self::write_op("ANY", args, depth, out),
            Expr::Not(args) => Self::write_op("NOT", args, depth, out),
        }
    }

    fn write_op(op: &str, args: &[Expr], depth: usize, out: &mut Vec<String>) {
        out.push(format!("{}{}", "  ".repeat(depth), op));
        for arg in args {
            arg.write(depth + 1, out);
        }
    }
}
