use crate::models::{AutomationStep, Intent, Key};

const MAX_TYPED_CHARS: usize = 120;

/// Single-line, length-capped copy of user text that is safe to type.
fn typed_note(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(MAX_TYPED_CHARS).collect()
}

/// A quoted phrase in the request, if any, names the thing to search for.
fn search_term(request: &str) -> String {
    let mut parts = request.split(['"', '`']);
    let quoted = parts.nth(1).map(str::trim).filter(|term| !term.is_empty());
    typed_note(quoted.unwrap_or("error"))
}

/// Search for `term`, close the search box, jump to the next problem.
pub fn fix_error_steps(term: &str) -> Vec<AutomationStep> {
    let term = typed_note(term);
    if term.is_empty() {
        return Vec::new();
    }
    vec![
        AutomationStep::hotkey(&[Key::Control, Key::Char('f')]),
        AutomationStep::wait_ms(200),
        AutomationStep::type_text(term),
        AutomationStep::key(Key::Enter),
        AutomationStep::wait_ms(300),
        AutomationStep::key(Key::Escape),
        AutomationStep::key(Key::F(8)),
    ]
}

pub fn steps_for_request(intent: Intent, request: &str) -> Vec<AutomationStep> {
    let note = typed_note(request);
    match intent {
        Intent::FixError => fix_error_steps(&search_term(request)),
        Intent::Debug => vec![
            AutomationStep::key(Key::F(9)),
            AutomationStep::wait_ms(200),
            AutomationStep::key(Key::F(5)),
            AutomationStep::wait_ms(1000),
        ],
        // Shell text is typed but never submitted.
        Intent::SetupSoftware => vec![
            AutomationStep::hotkey(&[Key::Control, Key::Char('`')]),
            AutomationStep::wait_ms(800),
            AutomationStep::type_text(format!("# setup: {note}")),
        ],
        Intent::WriteCode => vec![
            AutomationStep::hotkey(&[Key::Control, Key::Char('n')]),
            AutomationStep::wait_ms(500),
            AutomationStep::type_text(format!("// {note}")),
            AutomationStep::key(Key::Enter),
        ],
        Intent::General => vec![
            AutomationStep::wait_ms(250),
            AutomationStep::key(Key::Escape),
        ],
    }
}
