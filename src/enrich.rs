//! Distance-from-home enrichment.

use crate::geo_utils::{haversine_km, round_to};
use crate::{HomeLocation, SchoolRecord};

/// Attach `distance_from_home` and sort nearest first.
///
/// Records without coordinates keep their previous value and sort last.
/// With no home the input comes back untouched, in its original order.
pub fn enrich(records: Vec<SchoolRecord>, home: Option<&HomeLocation>) -> Vec<SchoolRecord> {
    let Some(home) = home else {
        return records;
    };

    let mut enriched: Vec<SchoolRecord> = records
        .into_iter()
        .map(|record| enrich_one(record, home))
        .collect();

    // sort_by is stable, so equal distances keep input order
    enriched.sort_by(|a, b| match (a.distance_from_home, b.distance_from_home) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    enriched
}

/// Attach `distance_from_home` to a single record.
pub fn enrich_one(mut record: SchoolRecord, home: &HomeLocation) -> SchoolRecord {
    if let Some(location) = record.location() {
        let km = haversine_km(&home.location(), &location);
        record.distance_from_home = Some(round_to(km, 2));
    }
    record
}
