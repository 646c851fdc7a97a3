// Pod Table Parsing
//
// Extracts `(name, status)` rows from the human-readable pod listing.
// Column positions are tied to kubectl's output format, so the parser
// sits behind `StatusExtractor` and can be swapped without touching
// triage or execution.

/// One row of a pod listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatusRow {
    pub name: String,
    pub status: String,
}

/// Statuses that count as healthy.
pub const HEALTHY_STATUSES: [&str; 2] = ["Running", "Completed"];

/// Turns listing text into status rows.
pub trait StatusExtractor {
    fn extract(&self, listing: &str) -> Vec<PodStatusRow>;
}

/// Whitespace-column parser: name in column 1, status in column 3.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnarPodTable;

impl StatusExtractor for ColumnarPodTable {
    fn extract(&self, listing: &str) -> Vec<PodStatusRow> {
        listing
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with("NAME"))
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                // NAME READY STATUS RESTARTS at minimum
                if parts.len() < 4 {
                    return None;
                }
                Some(PodStatusRow {
                    name: parts[0].to_string(),
                    status: parts[2].to_string(),
                })
            })
            .collect()
    }
}

/// Names of unhealthy pods, in listing order.
pub fn unhealthy_pods(extractor: &dyn StatusExtractor, listing: &str) -> Vec<String> {
    extractor
        .extract(listing)
        .into_iter()
        .filter(|row| !HEALTHY_STATUSES.contains(&row.status.as_str()))
        .map(|row| row.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
NAME            READY   STATUS             RESTARTS      AGE   IP           NODE
api-7d9f-abc    0/1     CrashLoopBackOff   6 (30s ago)   5m    10.0.0.12    worker-1
web-5c8b-xyz    1/1     Running            0             5m    10.0.0.13    worker-2
migrate-q2w     0/1     Completed          0             9m    10.0.0.14    worker-2

img-6f7a-def    0/1     ImagePullBackOff   0             2m    10.0.0.15    worker-1
short line
";

    #[test]
    fn extracts_name_and_status_columns() {
        let rows = ColumnarPodTable.extract(LISTING);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            PodStatusRow {
                name: "api-7d9f-abc".into(),
                status: "CrashLoopBackOff".into()
            }
        );
    }

    #[test]
    fn unhealthy_keeps_collection_order() {
        let bad = unhealthy_pods(&ColumnarPodTable, LISTING);
        assert_eq!(bad, ["api-7d9f-abc", "img-6f7a-def"]);
    }

    #[test]
    fn header_only_listing_has_no_rows() {
        assert!(ColumnarPodTable
            .extract("NAME READY STATUS RESTARTS AGE\n")
            .is_empty());
    }
}
