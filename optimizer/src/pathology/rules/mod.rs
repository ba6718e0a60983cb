//! Pathology catalog : one file per operator family
//! (`common`/`scan`/`join`/`aggregate`/...).

mod cte;
mod filter;
mod join;
mod postgres;
mod scan;
mod window;

use super::Pathology;

pub fn all_pathologies() -> Vec<Box<dyn Pathology>> {
    vec![
        Box::new(cte::P0DateCteIsolate),
        Box::new(scan::P1SinglePassAggregation),
        Box::new(join::P2Decorrelate),
        Box::new(scan::P3AggregatePushdown),
        Box::new(filter::P4OrToUnion),
        Box::new(join::P5LeftToInnerJoin),
        Box::new(join::P6IntersectToExists),
        Box::new(cte::P7SelfJoinDecomposition),
        Box::new(window::P8DeferredWindowAggregation),
        Box::new(cte::P9MaterializeCte),
        Box::new(postgres::C1SeqScanDespiteIndex),
        Box::new(postgres::C2BitmapHeapThrash),
        Box::new(postgres::C3CorrelatedSubplanReexec),
        Box::new(postgres::C4SortSpill),
        Box::new(postgres::C5HashJoinOverflow),
        Box::new(postgres::C6RedundantCteMaterialization),
    ]
}
