use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;

use crate::stack_key::StackKey;

/// A thread-safe accumulator of per-allocation-site totals.
///
/// Counters only ever increase while ingestion is running; totals become
/// observable through `into_totals`, which consumes the aggregator and
/// therefore can only happen once every worker is done with it.
pub struct Aggregator {
    allocations: RwLock< HashMap< StackKey, Arc< AtomicU64 >, RandomState > >
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator {
            allocations: RwLock::new( HashMap::default() )
        }
    }

    /// Adds `amount` to the running total for `key`.
    ///
    /// Two workers racing to create the counter for a previously unseen
    /// key converge on a single counter: the loser of the race finds the
    /// winner's entry under the write lock and adds to it.
    pub fn record( &self, key: StackKey, amount: u64 ) {
        if let Some( counter ) = self.allocations.read().get( &key ) {
            counter.fetch_add( amount, Ordering::Relaxed );
            return;
        }

        let counter = self.allocations
            .write()
            .entry( key )
            .or_insert_with( || Arc::new( AtomicU64::new( 0 ) ) )
            .clone();

        counter.fetch_add( amount, Ordering::Relaxed );
    }

    /// How many distinct keys were recorded so far.
    pub fn site_count( &self ) -> usize {
        self.allocations.read().len()
    }

    pub fn into_totals( self ) -> Vec< (StackKey, u64) > {
        self.allocations
            .into_inner()
            .into_iter()
            .map( |(key, counter)| (key, counter.load( Ordering::Relaxed )) )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack_key::{ClassRef, StackTraceRef};
    use common::event::FrameRecord;
    use std::thread;

    fn key( name: &str ) -> StackKey {
        StackKey::new(
            Arc::new( StackTraceRef {
                frames: vec![ FrameRecord {
                    declaring_type: name.to_owned(),
                    method: "m".to_owned()
                }]
            }),
            Arc::new( ClassRef { descriptor: "B".to_owned() } )
        )
    }

    #[test]
    fn test_sequential_sum() {
        let aggregator = Aggregator::new();
        let a = key( "A" );
        let b = key( "B" );

        aggregator.record( a.clone(), 100 );
        aggregator.record( b.clone(), 1 );
        aggregator.record( a.clone(), 50 );

        let mut totals = aggregator.into_totals();
        totals.sort_by_key( |&(_, total)| total );
        assert_eq!( totals.len(), 2 );
        assert_eq!( totals[ 0 ].1, 1 );
        assert_eq!( totals[ 1 ].1, 150 );
    }

    #[test]
    fn test_concurrent_sum_over_one_key() {
        let aggregator = Arc::new( Aggregator::new() );
        let shared = key( "Shared" );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let aggregator = aggregator.clone();
            let shared = shared.clone();
            handles.push( thread::spawn( move || {
                for _ in 0..1000 {
                    aggregator.record( shared.clone(), 3 );
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let aggregator = Arc::try_unwrap( aggregator ).ok().unwrap();
        let totals = aggregator.into_totals();
        assert_eq!( totals.len(), 1 );
        assert_eq!( totals[ 0 ].1, 8 * 1000 * 3 );
    }

    quickcheck! {
        fn sum_invariant_holds_under_any_split( amounts: Vec< u32 > ) -> bool {
            let aggregator = Arc::new( Aggregator::new() );
            let site = key( "Site" );

            let chunk_size = (amounts.len() / 4).max( 1 );
            let mut handles = Vec::new();
            for chunk in amounts.chunks( chunk_size ) {
                let aggregator = aggregator.clone();
                let site = site.clone();
                let chunk = chunk.to_vec();
                handles.push( thread::spawn( move || {
                    for amount in chunk {
                        aggregator.record( site.clone(), amount as u64 );
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            let expected: u64 = amounts.iter().map( |&amount| amount as u64 ).sum();
            let aggregator = Arc::try_unwrap( aggregator ).ok().unwrap();
            let totals = aggregator.into_totals();

            if expected == 0 {
                totals.iter().map( |&(_, total)| total ).sum::< u64 >() == 0
            } else {
                totals.len() == 1 && totals[ 0 ].1 == expected
            }
        }
    }
}
