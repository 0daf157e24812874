//! Tip command handler

use sanad_core::tips;

use crate::output::Output;

/// Print a random self-help tip
pub fn show(output: &Output) {
    output.print_tip(tips::random_tip());
}
