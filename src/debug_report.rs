use seqex::{CompiledPattern, Element, MatchResult, MultiRun, SearchMetrics, Token};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
        if self.enabled { format!("{}{}{}", color, s.as_ref(), ansi::RESET) } else { s.as_ref().to_string() }
    }

    fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s, ansi::BOLD)
    }

    fn dim(&self, s: impl AsRef<str>) -> String {
        self.paint(s, ansi::DIM)
    }

    fn section(&self, title: &str) {
        println!("\n{}", self.paint(format!("━━━ {title} ━━━"), ansi::GRAY));
    }
}

pub fn print_header(tokens: &[Token], palette: &Palette) {
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Searching {} elements", tokens.len()), ansi::CYAN)));
    let rendered: Vec<String> = tokens
        .iter()
        .map(|t| match t.attribute("tag") {
            Some(tag) => format!("{}{}", t.as_str(), palette.dim(format!("/{tag}"))),
            None => t.as_str().to_string(),
        })
        .collect();
    println!("  {}", rendered.join(" "));
}

pub fn print_matches(source: &str, found: &[MatchResult<'_>], palette: &Palette) {
    palette.section("Matches");
    println!("  {} {}", palette.dim("pattern:"), palette.paint(source, ansi::BLUE));
    if found.is_empty() {
        println!("{}", palette.dim("  No matches"));
        return;
    }
    for (idx, m) in found.iter().enumerate() {
        print_match(idx, m, palette);
    }
}

pub fn print_search_metrics(metrics: &SearchMetrics, palette: &Palette) {
    palette.section("Metrics");
    println!(
        "  Steps: {}  │  Backtracks: {}  │  Starts: {}  │  Matches: {}  │  Time: {}",
        palette.paint(metrics.steps.to_string(), ansi::YELLOW),
        palette.paint(metrics.backtracks.to_string(), ansi::YELLOW),
        palette.dim(metrics.attempts.to_string()),
        palette.paint(metrics.matches.to_string(), ansi::GREEN),
        palette.paint(format!("{:?}", metrics.elapsed), ansi::CYAN),
    );
}

pub fn print_multi(patterns: &[CompiledPattern], run: &MultiRun<'_>, palette: &Palette) {
    palette.section("Patterns");
    for (idx, pattern) in patterns.iter().enumerate() {
        println!(
            "  {} {} {}",
            palette.paint(format!("#{idx}"), ansi::GRAY),
            palette.paint(pattern.source(), ansi::BLUE),
            palette.dim(format!("score {}", pattern.score())),
        );
    }

    palette.section("Candidates");
    if run.candidates.is_empty() {
        println!("{}", palette.dim("  No candidates"));
    }
    for m in &run.candidates {
        println!(
            "  {} {} {}",
            palette.paint(format!("{}..{}", m.start(), m.end()), ansi::YELLOW),
            palette.paint(format!("#{}", m.pattern_index()), ansi::BLUE),
            palette.dim(m.text()),
        );
    }

    palette.section("Selected");
    if run.selected.is_empty() {
        println!("{}", palette.dim("  Nothing selected"));
    }
    for (idx, m) in run.selected.iter().enumerate() {
        print_match(idx, m, palette);
    }

    let metrics = &run.metrics;
    palette.section("Metrics");
    println!(
        "  Patterns: {}/{} active  │  Candidates: {}  │  Duplicates: {}  │  Total: {}",
        palette.paint(metrics.patterns_active.to_string(), ansi::GREEN),
        metrics.patterns_total,
        palette.paint(metrics.candidates.to_string(), ansi::YELLOW),
        palette.dim(metrics.duplicates.to_string()),
        palette.paint(format!("{:?}", metrics.elapsed), ansi::CYAN),
    );
    println!(
        "  Steps: {}  │  Backtracks: {}  │  Search: {}",
        palette.paint(metrics.search.steps.to_string(), ansi::YELLOW),
        palette.paint(metrics.search.backtracks.to_string(), ansi::YELLOW),
        palette.dim(format!("{:?}", metrics.search.elapsed)),
    );
}

fn print_match(idx: usize, m: &MatchResult<'_>, palette: &Palette) {
    println!(
        "  {} {} {} {}",
        palette.paint(format!("[{idx}]"), ansi::GRAY),
        palette.bold(palette.paint(m.text(), ansi::GREEN)),
        palette.dim("│"),
        palette.paint(format!("span {}..{}", m.start(), m.end()), ansi::YELLOW),
    );
    for group in 1..m.group_count() {
        let Ok(Some(span)) = m.group_span(group) else {
            continue;
        };
        let text = m.group(group).ok().flatten().unwrap_or_default();
        let name = m.var_groups().name_of(group).map(|n| format!(" ${n}")).unwrap_or_default();
        println!(
            "      {} {} {}",
            palette.paint(format!("group {group}{name}"), ansi::BLUE),
            palette.dim(format!("{}..{}", span.start, span.end)),
            text,
        );
    }
    for (index, value) in m.node_results() {
        println!("      {} {}", palette.paint(format!("node {index}"), ansi::CYAN), palette.dim(value.to_string()));
    }
}
