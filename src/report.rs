use owo_colors::OwoColorize;

/// Collects the user-facing output of one run: diagnostic messages, load-up
/// statistics, and the old/new load-order listings. In a CLI run each line is
/// echoed as it is added; under test the buffers stay silent and are
/// inspected directly. One instance is threaded through the parser and
/// driver, so unit tests stay hermetic.
pub struct Report {
    quiet: bool,
    echo: bool,
    messages: Vec<String>,
    stats: Vec<String>,
    old_order: Vec<String>,
    new_order: Vec<String>,
}

impl Report {
    pub fn new(quiet: bool) -> Self {
        Self::with_echo(quiet, true)
    }

    /// A silent report for tests and for `--explain` runs.
    pub fn buffered(quiet: bool) -> Self {
        Self::with_echo(quiet, false)
    }

    fn with_echo(quiet: bool, echo: bool) -> Self {
        Self {
            quiet,
            echo,
            messages: Vec::new(),
            stats: Vec::new(),
            old_order: Vec::new(),
            new_order: Vec::new(),
        }
    }

    /// `true` when `[NOTE]` diagnostics should be suppressed.
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn message(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.echo {
            println!("{}", text);
        }
        self.messages.push(text);
    }

    /// A user-visible warning. Stored plain, echoed with emphasis.
    pub fn warning(&mut self, text: impl Into<String>) {
        let text = format!("Warning: {}", text.into());
        if self.echo {
            println!("{}", text.yellow());
        }
        self.messages.push(text);
    }

    pub fn stat(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.echo {
            println!("{}", text);
        }
        self.stats.push(text);
    }

    /// The `%-50s (%3d things)` load-up line used for progress statistics.
    pub fn loadup(&mut self, what: &str, count: usize, unit: &str) {
        self.stat(format!("{:<50} ({:3} {})", what, count, unit));
    }

    pub fn old_line(&mut self, text: impl Into<String>) {
        self.old_order.push(text.into());
    }

    /// A line of the proposed order. Lines marked with `*` (moved up) are
    /// echoed highlighted.
    pub fn new_line(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.echo {
            if text.starts_with('*') {
                println!("{}", text.yellow().bold());
            } else {
                println!("{}", text);
            }
        }
        self.new_order.push(text);
    }

    /// Everything the run produced, one buffer after another. Backs the
    /// debug output file.
    pub fn dump(&self) -> String {
        let mut sections = Vec::new();
        if !self.stats.is_empty() {
            sections.push(self.stats.join("\n"));
        }
        if !self.messages.is_empty() {
            sections.push(self.messages.join("\n"));
        }
        if !self.old_order.is_empty() {
            sections.push(format!("Current Load Order:\n{}", self.old_order.join("\n")));
        }
        if !self.new_order.is_empty() {
            sections.push(format!("New Load Order:\n{}", self.new_order.join("\n")));
        }
        sections.join("\n\n")
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[cfg(test)]
    pub fn stats(&self) -> &[String] {
        &self.stats
    }

    #[cfg(test)]
    pub fn old_order(&self) -> &[String] {
        &self.old_order
    }

    #[cfg(test)]
    pub fn new_order(&self) -> &[String] {
        &self.new_order
    }
}
