/// A lazily compiled static `Regex`.
///
/// The pattern lexer scans identifiers and numbers with these; each call site
/// compiles its pattern once per process.
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}
