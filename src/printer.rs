//! User-facing errors and warnings, colored when stderr is a
//! terminal.

use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stderr() -> StandardStream {
    if atty::is(atty::Stream::Stderr) {
        StandardStream::stderr(ColorChoice::Auto)
    } else {
        StandardStream::stderr(ColorChoice::Never)
    }
}

fn tagged(color: Color, tag: &str, msg: &str) {
    let mut f = stderr();
    f.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))
        .ok();
    write!(f, "{}:", tag).ok();
    f.reset().ok();
    writeln!(f, " {}", msg).ok();
}

/// Report an error.
pub fn error(msg: &str) {
    tagged(Color::Red, "error", msg);
}

/// Report a warning.
pub fn warning(msg: &str) {
    tagged(Color::Yellow, "warning", msg);
}
