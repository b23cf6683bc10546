use std::error::Error;
use std::fmt::Write;

/// Deepest error in the `source()` chain
///
/// Returns `error` itself when it has no source. A source that is the same
/// object as the error holding it ends the walk.
pub fn deepest_cause<'a>(error: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut current = error;
    while let Some(cause) = current.source() {
        if is_same(current, cause) {
            break;
        }
        current = cause;
    }
    current
}

/// Render an error and its causes as one line, outermost first
///
/// Stops early on self-referencing sources and after a bounded number of
/// links.
pub fn render_chain(error: &(dyn Error + 'static)) -> String {
    const MAX_LINKS: usize = 32;

    let mut rendered = error.to_string();
    let mut current = error;
    for _ in 0..MAX_LINKS {
        let Some(cause) = current.source() else {
            break;
        };
        if is_same(current, cause) {
            break;
        }
        let _ = write!(rendered, ": caused by: {cause}");
        current = cause;
    }
    rendered
}

fn is_same(a: &(dyn Error + 'static), b: &(dyn Error + 'static)) -> bool {
    std::ptr::addr_eq(std::ptr::from_ref(a), std::ptr::from_ref(b))
}
