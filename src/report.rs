use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::fields::FieldRegistry;
use crate::index::{FieldIndex, Filters};
use crate::util::plural;

/// Records per year, read from the indexed year field. Values that are not
/// whole numbers are left out.
pub fn year_histogram(index: &FieldIndex, field: &str) -> BTreeMap<i64, usize> {
    index
        .field(field)
        .into_iter()
        .flatten()
        .filter_map(|(value, entry)| Some((value.trim().parse().ok()?, entry.count as usize)))
        .collect()
}

pub struct ReportContext<'a> {
    pub source: &'a str,
    pub years: &'a BTreeMap<i64, usize>,
    pub index: &'a FieldIndex,
    pub filters: &'a Filters,
    pub registry: &'a FieldRegistry,
}

/// Plain-text description of how the map was made.
pub fn text_report(context: &ReportContext<'_>) -> String {
    let ReportContext {
        source,
        years,
        index,
        filters,
        registry,
    } = context;
    let mut report = String::new();

    let records = index.record_count();
    let _ = writeln!(report, "CORPUS");
    let _ = writeln!(report);
    let period = match (years.keys().next(), years.keys().next_back()) {
        (Some(first), Some(last)) if first < last => format!(" and published from {first} to {last}"),
        (Some(first), Some(_)) => format!(" and published in {first}"),
        _ => String::new(),
    };
    let _ = writeln!(
        report,
        "We have analysed {records} bibliographic {} extracted from {source}{period}.",
        plural(records, "record", "records"),
    );
    if let (Some(&first), Some(&last)) = (years.keys().next(), years.keys().next_back()) {
        let _ = writeln!(report);
        let _ = writeln!(report, "Specifically, our corpus contained:");
        for year in first..=last {
            let count = years.get(&year).copied().unwrap_or(0);
            let _ = writeln!(
                report,
                "- {count} {} published in {year}",
                plural(count, "record", "records"),
            );
        }
    }

    let reference = registry.reference();
    let threshold = filters.threshold(&reference.id).max(1);
    let _ = writeln!(report);
    let _ = writeln!(report);
    let _ = writeln!(report, "BASE MAP");
    let _ = writeln!(report);
    let _ = writeln!(
        report,
        "We extracted the {} references present in this corpus and kept the {} references cited by at least {threshold} {}.",
        index.distinct_values(&reference.id),
        index.kept_values(&reference.id, threshold),
        plural(threshold as usize, "record", "records"),
    );
    let _ = writeln!(
        report,
        "We built the co-citation network of these references weighted by the frequency of their co-occurrence (aka bibliographic coupling)."
    );
    let _ = writeln!(report, "We removed the nodes with no connection at all.");
    let _ = writeln!(
        report,
        "We spatialized the network with a force-directed layout and fixed the position of the reference nodes at equilibrium."
    );

    let _ = writeln!(report);
    let _ = writeln!(report);
    let _ = writeln!(report, "METADATA LAYER");
    let _ = writeln!(report);
    let _ = writeln!(
        report,
        "From the same corpus we extracted and added to the network:"
    );
    for field in registry.metadata() {
        let threshold = filters.threshold(&field.id).max(1);
        let kept = index.kept_values(&field.id, threshold);
        let _ = writeln!(
            report,
            "- {kept} {} for \"{}\" occurring in at least {threshold} {}",
            plural(kept, "value", "values"),
            field.label,
            plural(threshold as usize, "record", "records"),
        );
    }
    if let Some(layer) = registry.record_layer() {
        let threshold = filters.threshold(&layer.id);
        let kept = index.kept_values(&layer.id, threshold);
        let _ = writeln!(
            report,
            "- {kept} {} as \"{}\" cited at least {threshold} {}",
            plural(kept, "record", "records"),
            layer.label,
            plural(threshold as usize, "time", "times"),
        );
    }
    let _ = writeln!(report);
    let _ = writeln!(
        report,
        "We connected these new nodes to the references co-appearing with them in the bibliographic records."
    );
    let _ = writeln!(
        report,
        "We only kept the largest connected component from the graph."
    );
    let _ = writeln!(
        report,
        "We positioned new nodes with the same layout algorithm while keeping fixed the position of the reference nodes."
    );
    let _ = write!(
        report,
        "We sized the nodes according to the number of records in which they occurred and coloured them according to their type."
    );

    report
}
