use proptest::prelude::*;
use specdb_core::filter::{
    compare_records, FilterBuilder, RelatedKeys, SortKey, MAX_ENUMERATED_RANGE,
};
use specdb_core::Record;

fn specimen(number: u32) -> Record {
    [("specimenNumber", number.to_string())].into_iter().collect()
}

fn matching(filter: &str, numbers: &[u32]) -> Vec<u32> {
    let predicate = FilterBuilder::parse_filter("specimenNumber", filter, true);
    let related = RelatedKeys::new();
    numbers
        .iter()
        .copied()
        .filter(|n| predicate.matches(&specimen(*n), &related))
        .collect()
}

proptest! {
    /// Property: `a:b` matches exactly the integers in [a, b]
    #[test]
    fn prop_range_matches_inclusive_bounds(a in 0u32..300, len in 0u32..100) {
        let b = a + len;
        let universe: Vec<u32> = (0..500).collect();
        let got = matching(&format!("{a}:{b}"), &universe);
        let expected: Vec<u32> = (a..=b).collect();
        prop_assert_eq!(got, expected);
    }

    /// Property: a comma list is the union of its parts
    #[test]
    fn prop_comma_list_is_union(
        parts in prop::collection::vec((0u32..200, 0u32..20), 1..5),
    ) {
        let universe: Vec<u32> = (0..250).collect();
        let exprs: Vec<String> = parts.iter().map(|(a, len)| format!("{}:{}", a, a + len)).collect();

        let combined = matching(&exprs.join(", "), &universe);
        let mut union: Vec<u32> = exprs.iter().flat_map(|e| matching(e, &universe)).collect();
        union.sort_unstable();
        union.dedup();
        prop_assert_eq!(combined, union);
    }

    /// Property: arbitrary input never panics
    #[test]
    fn prop_parse_never_panics(input in ".{0,40}") {
        let _ = FilterBuilder::parse_filter("specimenNumber", &input, true);
        let _ = FilterBuilder::parse_filter("catalogNumber", &input, true);
        let _ = FilterBuilder::extract_year_values(&input);
    }

    /// Property: catalog ranges agree with numeric comparison of the padded suffix
    #[test]
    fn prop_catalog_range_by_suffix(start in 0u32..500, len in 0u32..500, probe in 0u32..1200) {
        let end = start + len;
        let predicate = FilterBuilder::parse_filter(
            "catalogNumber",
            &format!("2023-KL-{start:04}:{end:04}"),
            true,
        );
        let record: Record = [("catalogNumber", format!("2023-KL-{probe:04}"))].into_iter().collect();
        let hit = predicate.matches(&record, &RelatedKeys::new());
        prop_assert_eq!(hit, (start..=end).contains(&probe));
    }

    /// Property: numeric ordering agrees with integer ordering
    #[test]
    fn prop_numeric_sort(mut numbers in prop::collection::vec(0u32..100_000, 0..50)) {
        let mut records: Vec<Record> = numbers.iter().map(|n| specimen(*n)).collect();
        records.sort_by(|a, b| compare_records(a, b, &[SortKey::NumericText("specimenNumber")]));
        numbers.sort_unstable();
        let sorted: Vec<u32> = records
            .iter()
            .map(|r| r.get("specimenNumber").unwrap().parse().unwrap())
            .collect();
        prop_assert_eq!(sorted, numbers);
    }
}

#[test]
fn year_expansion_matches_listing() {
    let years = FilterBuilder::extract_year_values("2022, 2023:2025");
    assert_eq!(years, vec!["2022", "2023", "2024", "2025"]);
}

#[test]
fn huge_ranges_are_not_enumerated() {
    let span = MAX_ENUMERATED_RANGE * 10;
    let years = FilterBuilder::extract_year_values(&format!("0:{span}"));
    assert_eq!(years, vec![format!("0:{span}")]);
}
