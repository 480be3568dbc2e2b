/// How a rule recognizes its keyword on a single line of text.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Case-insensitive substring.
    Literal(&'static str),
    /// Regular expression, compiled case-insensitive.
    Pattern(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub keyword: &'static str,
    pub matcher: Matcher,
    pub hint: &'static str,
}

const fn literal(keyword: &'static str, hint: &'static str) -> Rule {
    Rule {
        keyword,
        matcher: Matcher::Literal(keyword),
        hint,
    }
}

const fn pattern(keyword: &'static str, regex: &'static str, hint: &'static str) -> Rule {
    Rule {
        keyword,
        matcher: Matcher::Pattern(regex),
        hint,
    }
}

pub const DEFAULT_RULES: &[Rule] = &[
    literal(
        "error",
        "Read the full error message and jump to the file and line it points at.",
    ),
    literal(
        "exception",
        "An exception escaped; check its type and guard the failing call.",
    ),
    literal(
        "failed",
        "Something failed; re-run it and inspect its inputs and output.",
    ),
    literal(
        "denied",
        "The operation was denied; check permissions on the target.",
    ),
    literal(
        "invalid",
        "An invalid value was supplied; validate the input format.",
    ),
    literal(
        "undefined",
        "A name is undefined; check spelling, imports and declaration order.",
    ),
    literal(
        "null",
        "A null value was dereferenced; add a null check or initialize the value first.",
    ),
    literal(
        "crash",
        "The program crashed; restart it and look at the crash report.",
    ),
    literal(
        "fatal",
        "A fatal error stopped execution; read the log lines just before it.",
    ),
    literal(
        "warning",
        "A warning was reported; fix it before it becomes an error.",
    ),
    literal(
        "connection refused",
        "Nothing is listening there; start the service or check host and port.",
    ),
    literal(
        "access denied",
        "Access was denied; verify credentials and access rights.",
    ),
    literal(
        "permission denied",
        "Permission denied; check file ownership or run with the needed privileges.",
    ),
    literal(
        "not found",
        "Something was not found; verify the path, URL or package name.",
    ),
    pattern(
        "timeout",
        r"\btime(d)?[ -]?out\b",
        "An operation timed out; check connectivity or raise the timeout.",
    ),
    literal(
        "segmentation fault",
        "Invalid memory access; run under a debugger to find the faulting address.",
    ),
    pattern(
        "traceback",
        r"traceback \(most recent call last\)",
        "Python traceback; the last frame shows where the exception was raised.",
    ),
    pattern(
        "stack trace",
        r"^\s*at\s+[\w$.<>]+\s*\([^)]*\)",
        "Stack trace on screen; the topmost frame from your code is the place to look.",
    ),
    pattern(
        "panic",
        r"panicked at",
        "A Rust thread panicked; the message names the file and line.",
    ),
];
