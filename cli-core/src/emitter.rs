use std::io::{self, Write};

use crate::collate::RankedLine;

/// Writes the ranked lines as collapsed-stack text, one
/// `<canonical-text> <total>` per line, in the given order.
pub fn write_collapsed( lines: &[ RankedLine ], mut output: impl Write ) -> io::Result< () > {
    for line in lines {
        writeln!( output, "{}", line )?;
    }

    output.flush()
}
