//! Terminal rendering of driver failures

use std::io::{self, IsTerminal, Write};
use std::ops::Range;
use std::path::Path;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use tarn_ast::Span;
use tarn_typeck::Diagnostic;

use crate::error::{DriverError, Location};

/// Write a failure to stderr, with source excerpts where program text is known
pub fn failure(err: &DriverError) -> io::Result<()> {
    match err {
        DriverError::Check { path, text, diagnostics } => {
            for diagnostic in diagnostics {
                match text {
                    Some(text) => render_diagnostic(path, text, diagnostic)?,
                    None => eprint!("{}", plain_diagnostic(path, diagnostic)),
                }
            }
            eprintln!("error: {}", err);
            Ok(())
        }
        DriverError::Trap { location: Some(Location { path, text: Some(text), span }), .. } => {
            render(path, text, None, &err.to_string(), span, "trapped here", &[])
        }
        DriverError::Trap { location: Some(Location { path, text: None, span }), .. } => {
            eprintln!("error: {}", err);
            eprintln!("  --> {}:{}", path.display(), range(span).start);
            Ok(())
        }
        _ => {
            eprintln!("error: {}", err);
            Ok(())
        }
    }
}

/// One line per diagnostic plus one per note
pub fn plain_diagnostic(path: &Path, diagnostic: &Diagnostic) -> String {
    let mut out = format!(
        "{}:{}..{}: error[{}]: {}\n",
        path.display(),
        diagnostic.span.start,
        diagnostic.span.end,
        diagnostic.kind.code(),
        diagnostic
    );
    for (span, note) in &diagnostic.secondary {
        out.push_str(&format!("  note at {}..{}: {}\n", span.start, span.end, note));
    }
    out
}

fn render_diagnostic(path: &Path, text: &str, diagnostic: &Diagnostic) -> io::Result<()> {
    render(
        path,
        text,
        Some(diagnostic.kind.code()),
        &diagnostic.kind.to_string(),
        &diagnostic.span,
        &diagnostic.message,
        &diagnostic.secondary,
    )
}

fn render(
    path: &Path,
    text: &str,
    code: Option<&str>,
    title: &str,
    primary: &Span,
    label: &str,
    notes: &[(Span, String)],
) -> io::Result<()> {
    let name = path.display().to_string();
    let file = name.as_str();
    let config = Config::default().with_color(io::stderr().is_terminal());

    let mut report = Report::build(ReportKind::Error, (file, range(primary)))
        .with_config(config)
        .with_message(title)
        .with_label(Label::new((file, range(primary))).with_message(label).with_color(Color::Red));
    if let Some(code) = code {
        report = report.with_code(code);
    }
    for (span, note) in notes {
        report = report.with_label(Label::new((file, range(span))).with_message(note).with_color(Color::Blue));
    }

    let mut stderr = io::stderr().lock();
    report.finish().write((file, Source::from(text)), &mut stderr)?;
    stderr.flush()
}

fn range(span: &Span) -> Range<usize> {
    span.start..span.end
}
