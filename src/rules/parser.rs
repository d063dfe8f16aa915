use crate::graph::{EdgeOutcome, PluginGraph};
use crate::io::game_dirs::CaselessDir;
use crate::io::plugin_desc::plugin_description;
use crate::plugins::{ActiveSet, NameTable, PluginId};
use crate::report::Report;
use crate::rules::expression::Expr;
use crate::rules::RuleKind;
use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use log::{debug, trace};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// The compiled lexical shape of the rule language.
struct RuleSyntax {
    /// A comment runs from a semicolon at line start, or after whitespace,
    /// to end of line.
    comment: Regex,
    /// A rule header: bracketed keyword at column 0, optional inline text
    /// before the closing bracket, optional trailing text after it.
    rule: Regex,
    /// A message continuation line starts with whitespace.
    message: Regex,
    /// A plugin name: no whitespace lead, no `[`, ends in `.esm`/`.esp`.
    /// `*` and `?` are filename wildcards.
    plugin: Regex,
    start_fun: Regex,
    end_fun: Regex,
    desc: Regex,
}

impl RuleSyntax {
    fn new() -> Self {
        Self {
            comment: Regex::new(r"(?:^|\s);.*$").expect("safe"),
            rule: Regex::new(
                r"(?i)^\[(order|nearend|nearstart|conflict|note|patch|requires)((?:\s+.[^\]]*)?)\](.*)$",
            )
            .expect("safe"),
            message: Regex::new(r"^\s").expect("safe"),
            plugin: Regex::new(r"(?i)^(\S[^\[]*?\.es[mp]\b)(\s*)").expect("safe"),
            start_fun: Regex::new(r"(?i)^\[(ALL|ANY|NOT|DESC)\s*").expect("safe"),
            end_fun: Regex::new(r"^\]\s*").expect("safe"),
            desc: Regex::new(r"(?i)^\[DESC\s*/([^/]+)/\s*([^\]]*)\]").expect("safe"),
        }
    }
}

/// A recursive-descent parser for rule files.
///
/// Evaluation is not a separate phase: expressions are evaluated against the
/// active set as they are recognized, so the truth value can immediately
/// decide whether a diagnostic is emitted. Ordering rules feed the graph as
/// a side effect. Recovery is per rule: a malformed rule is reported and
/// abandoned, and parsing resumes at the next header.
pub struct RuleParser<'a> {
    names: &'a mut NameTable,
    graph: &'a mut PluginGraph,
    active: &'a ActiveSet,
    plugin_dir: Option<&'a CaselessDir>,
    report: &'a mut Report,
    syntax: RuleSyntax,
    input: Option<Box<dyn BufRead + 'a>>,
    rule_file: String,
    line_num: usize,
    /// The parse buffer: the unconsumed remainder of the current line, plus
    /// anything pushed back by wildcard expansion.
    buffer: String,
    /// Free-text message lines of the rule being parsed.
    message: Vec<String>,
    curr_rule: &'static str,
}

impl<'a> RuleParser<'a> {
    pub fn new(
        names: &'a mut NameTable,
        graph: &'a mut PluginGraph,
        active: &'a ActiveSet,
        plugin_dir: Option<&'a CaselessDir>,
        report: &'a mut Report,
    ) -> Self {
        Self {
            names,
            graph,
            active,
            plugin_dir,
            report,
            syntax: RuleSyntax::new(),
            input: None,
            rule_file: String::new(),
            line_num: 0,
            buffer: String::new(),
            message: Vec::new(),
            curr_rule: "",
        }
    }

    /// Parses one rule file. Returns the number of rules read; the error is
    /// only for a file that cannot be opened, so the caller can decide
    /// whether that is fatal.
    pub fn read_rules(&mut self, path: &Path) -> Result<usize> {
        let file = File::open(path)
            .with_context(|| anyhow!("unable to open rules file {}", path.display()))?;
        Ok(self.parse(Box::new(BufReader::new(file)), &path.display().to_string()))
    }

    /// Parses rules from any line source; `label` is used in diagnostics.
    pub fn read_rules_from(&mut self, input: impl BufRead + 'a, label: &str) -> usize {
        self.parse(Box::new(input), label)
    }

    fn parse(&mut self, input: Box<dyn BufRead + 'a>, label: &str) -> usize {
        trace!("reading rules from \"{}\"", label);
        self.input = Some(input);
        self.rule_file = label.to_string();
        self.line_num = 0;
        self.buffer.clear();

        let mut n_rules = 0usize;
        loop {
            if self.buffer.trim().is_empty() {
                if !self.read_line() {
                    break;
                }
            }
            let line = self.buffer.clone();
            if let Some(header) = self.syntax.rule.captures(&line) {
                n_rules += 1;
                let keyword = header.get(1).expect("safe").as_str();
                let inline = header.get(2).map_or("", |m| m.as_str());
                let trailing = header.get(3).map_or("", |m| m.as_str());
                self.message.clear();
                match RuleKind::from_keyword(keyword) {
                    Some(kind) if kind.is_ordering() => {
                        self.curr_rule = kind.label();
                        self.buffer = trailing.trim().to_string();
                        self.parse_ordering(kind);
                    }
                    Some(kind) => {
                        self.curr_rule = kind.label();
                        self.buffer.clear();
                        self.parse_predicate(kind, inline, trailing);
                    }
                    None => {
                        // the header regex only admits known keywords
                        self.parse_error(&format!("unknown rule in \"{}\"", line));
                        self.buffer.clear();
                    }
                }
            } else {
                self.parse_error(&format!("expected start of rule: \"{}\"", line));
                self.buffer.clear();
            }
        }

        self.input = None;
        self.report
            .loadup(&format!("Read rules from: \"{}\"", self.rule_file), n_rules, "rules");
        self.graph.reverse_nearend();
        n_rules
    }

    fn location(&self) -> String {
        format!("{}:{}", self.rule_file, self.line_num)
    }

    fn parse_error(&mut self, what: &str) {
        self.report.message(format!(
            "{}: Parse Error({}), {}",
            self.location(),
            self.curr_rule,
            what
        ));
    }

    /// Loads the next non-blank line (after comment stripping) into the
    /// parse buffer. Returns `false` at end of input, releasing the handle.
    fn read_line(&mut self) -> bool {
        let mut raw = String::new();
        loop {
            let Some(input) = self.input.as_mut() else {
                return false;
            };
            raw.clear();
            match input.read_line(&mut raw) {
                Ok(0) => {
                    trace!("{}: end of input", self.rule_file);
                    self.input = None;
                    self.buffer.clear();
                    return false;
                }
                Ok(_) => {
                    self.line_num += 1;
                    let line = raw.trim_end_matches(|c| c == '\n' || c == '\r');
                    let line = self.syntax.comment.replace(line, "");
                    let line = line.trim_end();
                    if !line.is_empty() {
                        trace!("{}: read: {}", self.location(), line);
                        self.buffer = line.to_string();
                        return true;
                    }
                }
                Err(e) => {
                    debug!("{}: read failed: {}", self.rule_file, e);
                    self.input = None;
                    self.buffer.clear();
                    return false;
                }
            }
        }
    }

    /// Extracts the next plugin-name token from the buffer and canonicalizes
    /// it. Wildcarded names are expanded against the active set: the first
    /// match (lexicographic) becomes the token and the rest are pushed back
    /// into the buffer. Returns the token and whether it is active, or
    /// `None` after reporting a parse error.
    fn parse_plugin_name(&mut self) -> Option<(bool, PluginId)> {
        let buff = self.buffer.trim().to_string();
        let Some(token) = self.syntax.plugin.captures(&buff) else {
            self.parse_error(&format!("expected a plugin name: \"{}\"", buff));
            self.buffer.clear();
            return None;
        };

        let raw = token.get(1).expect("safe").as_str();
        let consumed = token.get(0).expect("safe").end();
        let mut id = self.names.canonical(raw);
        self.buffer = buff[consumed..].trim_start().to_string();

        if self.names.cname(id).contains(|c| matches!(c, '*' | '?')) {
            id = self.expand_wildcard(id);
        }

        let exists = self.active.contains(id);
        trace!("plugin token: {} (active: {})", self.names.cname(id), exists);
        Some((exists, id))
    }

    fn expand_wildcard(&mut self, id: PluginId) -> PluginId {
        let pattern = wildcard_pattern(self.names.cname(id));
        let matcher = Regex::new(&pattern).expect("safe");

        let names = &self.names;
        let mut matches = self
            .active
            .iter()
            .filter(|&p| matcher.is_match(names.cname(p)))
            .collect_vec();
        matches.sort_by(|&a, &b| names.cname(a).cmp(names.cname(b)));
        trace!(
            "wildcard {} matched {} active plugins",
            names.cname(id),
            matches.len()
        );

        if matches.is_empty() {
            return id;
        }
        let first = matches.remove(0);
        if !matches.is_empty() {
            let rest = matches.iter().map(|&p| names.cname(p)).join(" ");
            self.buffer = if self.buffer.is_empty() {
                rest
            } else {
                format!("{} {}", rest, self.buffer)
            };
        }
        first
    }

    /// Body of ORDER / NEARSTART / NEAREND: a stream of plugin-name tokens
    /// running until the next rule header or end of input.
    fn parse_ordering(&mut self, kind: RuleKind) {
        let mut prev: Option<PluginId> = None;
        let mut n_order = 0usize;
        loop {
            if self.buffer.trim().is_empty() {
                if !self.read_line() {
                    break;
                }
            }
            if self.syntax.rule.is_match(&self.buffer) {
                break;
            }
            let Some((_, id)) = self.parse_plugin_name() else {
                continue;
            };
            n_order += 1;
            match kind {
                RuleKind::Order => {
                    if let Some(p) = prev {
                        self.add_rule_edge(p, id);
                    }
                    prev = Some(id);
                }
                RuleKind::NearStart => self.graph.add_nearstart(id),
                RuleKind::NearEnd => self.graph.add_nearend(id),
                _ => break,
            }
        }

        if kind == RuleKind::Order {
            if n_order == 0 {
                self.report
                    .warning(format!("{}: ORDER rule has no entries", self.location()));
            } else if n_order == 1 {
                let name = prev.map(|p| self.names.true_name(p)).unwrap_or_default();
                self.report.warning(format!(
                    "{}: ORDER rule skipped because it only has one entry: {}",
                    self.location(),
                    name
                ));
            }
        }
    }

    fn add_rule_edge(&mut self, p: PluginId, q: PluginId) {
        match self.graph.add_edge(p, q) {
            EdgeOutcome::Added => trace!(
                "{}: adding edge: {} -> {}",
                self.location(),
                self.names.cname(p),
                self.names.cname(q)
            ),
            EdgeOutcome::Duplicate => debug!(
                "{}: duplicate edge: \"{}\" -> \"{}\"",
                self.location(),
                self.names.true_name(p),
                self.names.true_name(q)
            ),
            EdgeOutcome::Cycle => self.report.warning(format!(
                "{}: cycle detected, not adding: \"{}\" -> \"{}\"",
                self.location(),
                self.names.true_name(p),
                self.names.true_name(q)
            )),
        }
    }

    /// Collects indented continuation lines into the rule message. Stops at
    /// the first non-indented line, which stays in the buffer for the
    /// expression parser.
    fn parse_message_block(&mut self) {
        while self.read_line() {
            if self.syntax.message.is_match(&self.buffer) {
                let line = self.buffer.clone();
                self.message.push(line);
            } else {
                return;
            }
        }
    }

    /// Body of CONFLICT / NOTE / PATCH / REQUIRES. `inline` is the header
    /// text between keyword and `]`, `trailing` the text after `]`; inline
    /// text seeds the message, trailing text seeds expression parsing, and
    /// indented continuation lines are only collected when both are empty.
    fn parse_predicate(&mut self, kind: RuleKind, inline: &str, trailing: &str) {
        let mut expr_seed = trailing.trim().to_string();
        if inline.is_empty() {
            if expr_seed.is_empty() {
                self.parse_message_block();
                expr_seed = self.buffer.clone();
            }
        } else {
            self.message.push(inline.to_string());
        }

        if expr_seed.is_empty() {
            if !self.read_line() {
                return;
            }
        } else {
            self.buffer = expr_seed;
        }

        let msg_text = if self.message.is_empty() {
            String::new()
        } else {
            format!(" |{}", self.message.join("\n |"))
        };

        match kind {
            RuleKind::Conflict => {
                let true_exprs = self.collect_true_expressions();
                if true_exprs.len() > 1 {
                    self.report.message("[CONFLICT]");
                    for expr in &true_exprs {
                        let text = expr.pretty(" > ");
                        self.report.message(text);
                    }
                    if !msg_text.is_empty() {
                        self.report.message(msg_text);
                    }
                }
            }
            RuleKind::Note => {
                let true_exprs = self.collect_true_expressions();
                if !self.report.quiet() && !true_exprs.is_empty() {
                    self.report.message("[NOTE]");
                    for expr in &true_exprs {
                        let text = expr.pretty(" > ");
                        self.report.message(text);
                    }
                    if !msg_text.is_empty() {
                        self.report.message(msg_text);
                    }
                }
            }
            RuleKind::Patch => {
                let Some(((first_true, first), (second_true, second))) = self.parse_two() else {
                    let location = self.location();
                    self.report
                        .warning(format!("{}: PATCH rule must have 2 conditions", location));
                    return;
                };
                if first_true && !second_true {
                    // the patch is present but the thing to be patched is missing
                    self.report.message(format!(
                        "[PATCH]\n{} is missing some pre-requisites:\n{}",
                        first.pretty(" "),
                        second.pretty(" ")
                    ));
                    if !msg_text.is_empty() {
                        self.report.message(msg_text);
                    }
                } else if second_true && !first_true {
                    // the patch is missing for the thing to be patched
                    self.report.message(format!(
                        "[PATCH]\n{} for:\n{}",
                        first.pretty(" "),
                        second.pretty(" ")
                    ));
                    if !msg_text.is_empty() {
                        self.report.message(msg_text);
                    }
                }
            }
            RuleKind::Requires => {
                let Some(((first_true, first), (second_true, second))) = self.parse_two() else {
                    self.parse_error("rule must have 2 conditions");
                    return;
                };
                if first_true && !second_true {
                    self.report.message(format!(
                        "[REQUIRES]\n{} Requires:\n{}",
                        first.pretty(" "),
                        second.pretty(" > ")
                    ));
                    if !msg_text.is_empty() {
                        self.report.message(msg_text);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_true_expressions(&mut self) -> Vec<Expr> {
        let mut true_exprs = Vec::new();
        while let Some((truth, expr)) = self.parse_expression() {
            if truth {
                true_exprs.push(expr);
            }
        }
        true_exprs
    }

    fn parse_two(&mut self) -> Option<((bool, Expr), (bool, Expr))> {
        let first = self.parse_expression()?;
        let second = self.parse_expression()?;
        Some((first, second))
    }

    /// Recognizes and evaluates one expression, pulling more lines as
    /// needed. Returns `None` when the expression list ends (next rule
    /// header or end of input) or after a reported parse error.
    fn parse_expression(&mut self) -> Option<(bool, Expr)> {
        let trimmed = self.buffer.trim().to_string();
        self.buffer = trimmed;
        if self.buffer.is_empty() {
            if !self.read_line() {
                return None;
            }
            let trimmed = self.buffer.trim().to_string();
            self.buffer = trimmed;
        }
        if self.syntax.rule.is_match(&self.buffer) {
            trace!("expression list ended at a new rule header");
            return None;
        }

        let line = self.buffer.clone();
        let Some(fun) = self.syntax.start_fun.captures(&line) else {
            let (exists, id) = self.parse_plugin_name()?;
            let name = self.names.true_name(id).to_string();
            let expr = if exists {
                Expr::Plugin(name)
            } else {
                Expr::Missing(name)
            };
            return Some((exists, expr));
        };

        let keyword = fun.get(1).expect("safe").as_str().to_ascii_uppercase();
        if keyword == "DESC" {
            return self.parse_desc();
        }

        self.buffer.drain(..fun.get(0).expect("safe").end());
        let mut truths = Vec::new();
        let mut args = Vec::new();
        loop {
            let trimmed = self.buffer.trim_start().to_string();
            self.buffer = trimmed;
            if let Some(close) = self.syntax.end_fun.find(&self.buffer).map(|m| m.end()) {
                self.buffer.drain(..close);
                break;
            }
            let Some((truth, expr)) = self.parse_expression() else {
                self.parse_error(&format!("unterminated [{}] expression", keyword));
                return None;
            };
            truths.push(truth);
            args.push(expr);
        }

        // NOT is the negation of the conjunction of all its arguments; rule
        // corpora rely on the multi-argument form.
        let result = match keyword.as_str() {
            "ALL" => (truths.iter().all(|&t| t), Expr::All(args)),
            "ANY" => (truths.iter().any(|&t| t), Expr::Any(args)),
            "NOT" => (!truths.iter().all(|&t| t), Expr::Not(args)),
            _ => {
                self.parse_error(&format!("expected a boolean function: \"{}\"", keyword));
                return None;
            }
        };
        trace!("[{}] evaluated to {}", keyword, result.0);
        Some(result)
    }

    /// `[DESC /regex/ plugin]`: true when the plugin is active and the regex
    /// matches its header description. An inactive target is false without
    /// touching the file.
    fn parse_desc(&mut self) -> Option<(bool, Expr)> {
        let line = self.buffer.clone();
        let Some(body) = self.syntax.desc.captures(&line) else {
            self.parse_error(&format!("invalid [DESC] function: \"{}\"", line));
            return None;
        };

        let consumed = body.get(0).expect("safe").end();
        let pattern = body.get(1).expect("safe").as_str().to_string();
        let raw_name = body.get(2).expect("safe").as_str().trim();
        self.buffer = line[consumed..].to_string();

        let id = self.names.canonical(raw_name);
        let expr = Expr::Desc {
            pattern: pattern.clone(),
            name: self.names.cname(id).to_string(),
        };

        if !self.active.contains(id) {
            trace!("[DESC] target {} not active", self.names.cname(id));
            return Some((false, expr));
        }

        let matcher = match Regex::new(&pattern) {
            Ok(matcher) => matcher,
            Err(e) => {
                self.parse_error(&format!("invalid [DESC] regex /{}/: {}", pattern, e));
                return None;
            }
        };
        let description = self.read_description(id);
        let truth = matcher.is_match(&description);
        trace!(
            "[DESC /{}/ {}] evaluated to {}",
            pattern,
            self.names.cname(id),
            truth
        );
        Some((truth, expr))
    }

    fn read_description(&self, id: PluginId) -> String {
        let path = self
            .plugin_dir
            .and_then(|dir| dir.find_path(self.names.true_name(id)));
        let Some(path) = path else {
            debug!(
                "no file for {}; treating its description as empty",
                self.names.cname(id)
            );
            return String::new();
        };
        match plugin_description(&path) {
            Ok(description) => description,
            Err(e) => {
                debug!(
                    "failed to read description of {}: {}",
                    self.names.cname(id),
                    e
                );
                String::new()
            }
        }
    }
}

/// Translates a wildcarded plugin name into an anchored regex: `*` is any
/// run of characters, `?` exactly one.
fn wildcard_pattern(cname: &str) -> String {
    let mut pattern = String::from("^");
    for c in cname.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            _ => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Fixture {
        names: NameTable,
        graph: PluginGraph,
        active: ActiveSet,
        report: Report,
    }

    fn fixture(active: &[&str]) -> Fixture {
        let mut names = NameTable::new();
        let ids = active.iter().map(|name| names.canonical(name)).collect();
        Fixture {
            names,
            graph: PluginGraph::new(),
            active: ActiveSet::new(ids),
            report: Report::buffered(false),
        }
    }

    fn parse(fx: &mut Fixture, rules: &str) -> usize {
        let mut parser = RuleParser::new(
            &mut fx.names,
            &mut fx.graph,
            &fx.active,
            None,
            &mut fx.report,
        );
        parser.read_rules_from(Cursor::new(rules.to_string()), "rules.txt")
    }

    fn has_edge(fx: &Fixture, p: &str, q: &str) -> bool {
        let p = fx.names.lookup(p).expect("known");
        let q = fx.names.lookup(q).expect("known");
        fx.graph.children_of(p).contains(&q)
    }

    #[test]
    fn order_rule_adds_consecutive_edges() {
        let mut fx = fixture(&["a.esp", "b.esp", "c.esp"]);
        parse(&mut fx, "[ORDER]\na.esp\nb.esp\nc.esp\n");
        assert!(has_edge(&fx, "a.esp", "b.esp"));
        assert!(has_edge(&fx, "b.esp", "c.esp"));
        assert!(!has_edge(&fx, "a.esp", "c.esp"));
    }

    #[test]
    fn order_rule_accepts_names_on_the_header_line() {
        let mut fx = fixture(&["a.esp", "b.esp"]);
        parse(&mut fx, "[ORDER] a.esp b.esp\n");
        assert!(has_edge(&fx, "a.esp", "b.esp"));
    }

    #[test]
    fn comments_and_blank_lines_are_stripped() {
        let mut fx = fixture(&["a.esp", "b.esp"]);
        parse(
            &mut fx,
            "; leading comment\n[ORDER] ; trailing comment\na.esp\n\n  \nb.esp ; another\n",
        );
        assert!(has_edge(&fx, "a.esp", "b.esp"));
        assert!(fx.report.messages().is_empty());
    }

    #[test]
    fn order_rule_with_one_entry_warns() {
        let mut fx = fixture(&["a.esp"]);
        parse(&mut fx, "[ORDER]\na.esp\n");
        assert!(fx.report.messages()[0].contains("only has one entry: a.esp"));
    }

    #[test]
    fn order_rules_warn_on_cycles() {
        let mut fx = fixture(&["a.esp", "b.esp"]);
        parse(&mut fx, "[ORDER]\na.esp\nb.esp\n[ORDER]\nb.esp\na.esp\n");
        assert!(has_edge(&fx, "a.esp", "b.esp"));
        assert!(!has_edge(&fx, "b.esp", "a.esp"));
        let cycle_warnings = fx
            .report
            .messages()
            .iter()
            .filter(|m| m.contains("cycle detected"))
            .count();
        assert_eq!(cycle_warnings, 1);
    }

    #[test]
    fn rules_resume_after_a_parse_error() {
        let mut fx = fixture(&["a.esp", "b.esp"]);
        parse(&mut fx, "this is not a rule\n[ORDER]\na.esp\nb.esp\n");
        assert!(fx.report.messages()[0].contains("expected start of rule"));
        assert!(has_edge(&fx, "a.esp", "b.esp"));
    }

    #[test]
    fn nearend_list_is_reversed_per_file() {
        let mut fx = fixture(&["x.esp", "y.esp"]);
        parse(&mut fx, "[NEAREND]\nx.esp\ny.esp\n");
        let x = fx.names.lookup("x.esp").expect("known");
        let y = fx.names.lookup("y.esp").expect("known");
        assert_eq!(fx.graph.nearend(), &[y, x]);
        assert!(fx.graph.is_node(x));
        assert!(fx.graph.is_node(y));
    }

    #[test]
    fn nearstart_keeps_file_order() {
        let mut fx = fixture(&["x.esp", "y.esp"]);
        parse(&mut fx, "[NEARSTART]\nx.esp\ny.esp\n");
        let x = fx.names.lookup("x.esp").expect("known");
        let y = fx.names.lookup("y.esp").expect("known");
        assert_eq!(fx.graph.nearstart(), &[x, y]);
    }

    #[test]
    fn conflict_with_two_active_plugins_reports() {
        let mut fx = fixture(&["x.esp", "y.esp"]);
        parse(&mut fx, "[CONFLICT]\n Do not use together.\nx.esp\ny.esp\n");
        let messages = fx.report.messages();
        assert_eq!(messages[0], "[CONFLICT]");
        assert_eq!(messages[1], " > x.esp");
        assert_eq!(messages[2], " > y.esp");
        assert_eq!(messages[3], " | Do not use together.");
    }

    #[test]
    fn conflict_with_one_active_plugin_is_silent() {
        let mut fx = fixture(&["x.esp"]);
        parse(&mut fx, "[CONFLICT]\nx.esp\ny.esp\n");
        assert!(fx.report.messages().is_empty());
    }

    #[test]
    fn conflict_accepts_inline_message_and_trailing_expressions() {
        let mut fx = fixture(&["x.esp", "y.esp"]);
        parse(&mut fx, "[CONFLICT these clash] x.esp y.esp\n");
        let messages = fx.report.messages();
        assert_eq!(messages[0], "[CONFLICT]");
        assert_eq!(messages[3], " | these clash");
    }

    #[test]
    fn note_reports_any_true_expression() {
        let mut fx = fixture(&["a.esp"]);
        parse(&mut fx, "[NOTE]\n Outdated, consider upgrading.\na.esp\n");
        let messages = fx.report.messages();
        assert_eq!(messages[0], "[NOTE]");
        assert_eq!(messages[1], " > a.esp");
        assert_eq!(messages[2], " | Outdated, consider upgrading.");
    }

    #[test]
    fn note_is_suppressed_in_quiet_mode() {
        let mut fx = fixture(&["a.esp"]);
        fx.report = Report::buffered(true);
        parse(&mut fx, "[NOTE]\na.esp\n");
        assert!(fx.report.messages().is_empty());
    }

    #[test]
    fn requires_reports_missing_prerequisite() {
        let mut fx = fixture(&["patch.esp"]);
        parse(&mut fx, "[REQUIRES]\npatch.esp\nbase.esm\n");
        assert_eq!(
            fx.report.messages(),
            ["[REQUIRES]\n patch.esp Requires:\n > MISSING(base.esm)"]
        );
    }

    #[test]
    fn requires_with_one_expression_is_a_parse_error() {
        let mut fx = fixture(&["patch.esp"]);
        parse(&mut fx, "[REQUIRES]\npatch.esp\n");
        assert!(fx.report.messages()[0].contains("Parse Error(REQUIRES)"));
    }

    #[test]
    fn patch_reports_both_directions() {
        let mut fx = fixture(&["fix.esp"]);
        parse(&mut fx, "[PATCH]\nfix.esp\nbroken.esp\n");
        assert!(fx.report.messages()[0].contains("is missing some pre-requisites"));

        let mut fx = fixture(&["broken.esp"]);
        parse(&mut fx, "[PATCH]\nfix.esp\nbroken.esp\n");
        assert!(fx.report.messages()[0].contains("for:"));
    }

    #[test]
    fn patch_with_one_expression_warns() {
        let mut fx = fixture(&["fix.esp"]);
        parse(&mut fx, "[PATCH]\nfix.esp\n");
        assert!(fx.report.messages()[0].contains("PATCH rule must have 2 conditions"));
    }

    #[test]
    fn not_negates_the_conjunction_of_all_arguments() {
        // a.esp is active, b.esp is not: NOT(a, b) == !(a && b) == true.
        let mut fx = fixture(&["a.esp"]);
        parse(&mut fx, "[NOTE]\n[NOT a.esp b.esp]\n");
        assert_eq!(fx.report.messages()[0], "[NOTE]");

        // Both active: NOT(a, b) == false, nothing to report.
        let mut fx = fixture(&["a.esp", "b.esp"]);
        parse(&mut fx, "[NOTE]\n[NOT a.esp b.esp]\n");
        assert!(fx.report.messages().is_empty());
    }

    #[test]
    fn nested_expressions_span_lines() {
        let mut fx = fixture(&["a.esp", "c.esp"]);
        parse(&mut fx, "[NOTE]\n[ANY\n [ALL a.esp b.esp]\n c.esp]\n");
        let messages = fx.report.messages();
        assert_eq!(messages[0], "[NOTE]");
        assert!(messages[1].contains("ANY"));
        assert!(messages[1].contains("MISSING(b.esp)"));
    }

    #[test]
    fn unterminated_expression_is_a_parse_error() {
        let mut fx = fixture(&["a.esp"]);
        parse(&mut fx, "[NOTE]\n[ALL a.esp\n");
        assert!(fx
            .report
            .messages()
            .iter()
            .any(|m| m.contains("unterminated [ALL] expression")));
    }

    #[test]
    fn wildcard_expands_to_sorted_matches_with_push_back() {
        let mut fx = fixture(&["foo2.esp", "bar.esp", "foo1.esp"]);
        parse(&mut fx, "[ORDER]\nbar.esp foo*.esp\n");
        assert!(has_edge(&fx, "bar.esp", "foo1.esp"));
        assert!(has_edge(&fx, "foo1.esp", "foo2.esp"));
    }

    #[test]
    fn question_mark_matches_exactly_one_character() {
        let mut fx = fixture(&["mod1.esp", "mod22.esp", "base.esp"]);
        parse(&mut fx, "[ORDER]\nbase.esp mod?.esp\n");
        assert!(has_edge(&fx, "base.esp", "mod1.esp"));
        assert!(!has_edge(&fx, "mod1.esp", "mod22.esp"));
    }

    #[test]
    fn desc_is_false_without_file_access_when_target_inactive() {
        // No plugin directory is supplied, so a file access would surface as
        // an empty description; the inactive target must short-circuit first.
        let mut fx = fixture(&["a.esp"]);
        parse(&mut fx, "[NOTE]\n[DESC /anything/ missing.esp]\n");
        assert!(fx.report.messages().is_empty());
    }

    #[test]
    fn desc_matches_the_header_description() {
        use std::io::Write;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Versioned.esp");
        let mut file = File::create(&path).expect("create");
        file.write_all(&[0u8; 64]).expect("header");
        file.write_all(b"build 2.1\0").expect("description");
        drop(file);
        let listing = CaselessDir::new(dir.path()).expect("listing");

        let mut fx = fixture(&["Versioned.esp"]);
        {
            let mut parser = RuleParser::new(
                &mut fx.names,
                &mut fx.graph,
                &fx.active,
                Some(&listing),
                &mut fx.report,
            );
            parser.read_rules_from(
                Cursor::new("[NOTE]\n[DESC /build 2\\.1/ versioned.esp]\n".to_string()),
                "rules.txt",
            );
        }
        let messages = fx.report.messages();
        assert_eq!(messages[0], "[NOTE]");
        assert!(messages[1].contains("[DESC /build 2\\.1/ versioned.esp]"));
    }

    #[test]
    fn desc_mismatch_is_silent() {
        use std::io::Write;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("old.esp");
        let mut file = File::create(&path).expect("create");
        file.write_all(&[0u8; 64]).expect("header");
        file.write_all(b"build 1.0\0").expect("description");
        drop(file);
        let listing = CaselessDir::new(dir.path()).expect("listing");

        let mut fx = fixture(&["old.esp"]);
        {
            let mut parser = RuleParser::new(
                &mut fx.names,
                &mut fx.graph,
                &fx.active,
                Some(&listing),
                &mut fx.report,
            );
            parser.read_rules_from(
                Cursor::new("[NOTE]\n[DESC /build 2\\.1/ old.esp]\n".to_string()),
                "rules.txt",
            );
        }
        assert!(fx.report.messages().is_empty());
    }
}
