use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;

use crate::stack_key::{StackKey, RUNTIME_PREFIX};

/// One line of the final ranked output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RankedLine {
    pub text: String,
    pub total: u64
}

impl fmt::Display for RankedLine {
    fn fmt( &self, formatter: &mut fmt::Formatter ) -> fmt::Result {
        write!( formatter, "{} {}", self.text, self.total )
    }
}

/// Collapses the raw per-key totals into per-text totals.
///
/// Key identity is finer than text identity: independently captured pool
/// entries with the same rendered text are distinct keys, so their totals
/// have to be summed here or the same call path would show up fragmented.
pub fn fold( totals: Vec< (StackKey, u64) > ) -> HashMap< String, u64, RandomState > {
    let mut folded: HashMap< String, u64, RandomState > = HashMap::default();
    for (key, total) in totals {
        *folded.entry( key.canonical_text() ).or_insert( 0 ) += total;
    }

    folded
}

/// Orders the folded totals descending and applies the cutoff.
///
/// Entries below the cutoff are rolled up into a single trailing
/// `Filtered` line. The sort is unstable on purpose; the relative order of
/// equal totals carries no meaning.
pub fn rank( folded: HashMap< String, u64, RandomState >, cutoff: u64 ) -> Vec< RankedLine > {
    let mut lines = Vec::with_capacity( folded.len() );
    let mut filtered = 0;

    for (text, total) in folded {
        if total >= cutoff {
            lines.push( RankedLine { text, total } );
        } else {
            filtered += total;
        }
    }

    lines.sort_unstable_by( |lhs, rhs| rhs.total.cmp( &lhs.total ) );

    if filtered > 0 {
        lines.push( RankedLine {
            text: format!( "{}Filtered", RUNTIME_PREFIX ),
            total: filtered
        });
    }

    lines
}
