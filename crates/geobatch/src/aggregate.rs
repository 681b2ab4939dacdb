//! Flattening persisted responses into one CSV
//!
//! Every artifact in the output directory is parsed as a geocoding response
//! and each location becomes one row of `geocode_result.csv`. Artifacts are
//! visited in directory-listing order, so row order is not tied to input
//! order. Any artifact that fails to parse aborts the aggregation and the
//! partial output is removed.

use crate::artifact::ArtifactStore;
use crate::error::{GeobatchError, Result};
use crate::oracle::{GeocodeResponse, Location};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// File name of the aggregated output inside the output directory
pub const AGGREGATE_FILE_NAME: &str = "geocode_result.csv";

/// Column names of the aggregated output, in order
pub const OUTPUT_HEADER: [&str; 61] = [
    "resultid",
    "address",
    "cartesian_x",
    "cartesian_y",
    "locname",
    "status",
    "score",
    "matchaddr",
    "longlabel",
    "shortlabel",
    "addrtype",
    "type",
    "placename",
    "placeaddr",
    "phone",
    "url",
    "rank",
    "addbldg",
    "addnum",
    "addnumfrom",
    "addnumto",
    "addrange",
    "side",
    "stpredir",
    "stpretype",
    "stname",
    "sttype",
    "stdir",
    "bldgtype",
    "bldgname",
    "leveltype",
    "levelname",
    "unittype",
    "unitname",
    "subaddr",
    "staddr",
    "block",
    "sector",
    "nbrhd",
    "district",
    "city",
    "metroarea",
    "subregion",
    "region",
    "regionabbr",
    "territory",
    "zone",
    "postal",
    "postalext",
    "country",
    "langcode",
    "distance",
    "x",
    "y",
    "displayx",
    "displayy",
    "xmin",
    "xmax",
    "ymin",
    "ymax",
    "exinfo",
];

/// Outcome of one aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSummary {
    pub output: PathBuf,
    pub artifacts: usize,
    pub rows: usize,
}

/// Shortest decimal that parses back to the same `f64`, never in exponent form
fn float(value: f64) -> String {
    value.to_string()
}

/// Flatten one location into a row matching [`OUTPUT_HEADER`].
pub fn location_row(location: &Location) -> [String; 61] {
    let a = &location.attributes;
    [
        a.result_id.to_string(),
        location.address.clone(),
        float(location.location.x),
        float(location.location.y),
        a.loc_name.clone(),
        a.status.clone(),
        a.score.to_string(),
        a.match_addr.clone(),
        a.long_label.clone(),
        a.short_label.clone(),
        a.addr_type.clone(),
        a.kind.clone(),
        a.place_name.clone(),
        a.place_addr.clone(),
        a.phone.clone(),
        a.url.clone(),
        a.rank.to_string(),
        a.add_bldg.clone(),
        a.add_num.clone(),
        a.add_num_from.clone(),
        a.add_num_to.clone(),
        a.add_range.clone(),
        a.side.clone(),
        a.st_pre_dir.clone(),
        a.st_pre_type.clone(),
        a.st_name.clone(),
        a.st_type.clone(),
        a.st_dir.clone(),
        a.bldg_type.clone(),
        a.bldg_name.clone(),
        a.level_type.clone(),
        a.level_name.clone(),
        a.unit_type.clone(),
        a.unit_name.clone(),
        a.sub_addr.clone(),
        a.st_addr.clone(),
        a.block.clone(),
        a.sector.clone(),
        a.nbrhd.clone(),
        a.district.clone(),
        a.city.clone(),
        a.metro_area.clone(),
        a.subregion.clone(),
        a.region.clone(),
        a.region_abbr.clone(),
        a.territory.clone(),
        a.zone.clone(),
        a.postal.clone(),
        a.postal_ext.clone(),
        a.country.clone(),
        a.lang_code.clone(),
        a.distance.to_string(),
        float(a.x),
        float(a.y),
        float(a.display_x),
        float(a.display_y),
        float(a.xmin),
        float(a.xmax),
        float(a.ymin),
        float(a.ymax),
        a.ex_info.clone(),
    ]
}

/// Reads every artifact in a store and writes the flattened CSV
#[derive(Debug, Clone)]
pub struct Aggregator {
    store: ArtifactStore,
    output: PathBuf,
}

impl Aggregator {
    pub fn new(store: ArtifactStore) -> Self {
        let output = store.dir().join(AGGREGATE_FILE_NAME);
        Self { store, output }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Rebuild the aggregated CSV from scratch.
    ///
    /// An existing output file is removed first, so repeated runs over the
    /// same directory replace rather than append.
    pub fn aggregate(&self) -> Result<AggregateSummary> {
        let started = Instant::now();
        let artifacts = self.store.list()?;

        info!(
            dir = %self.store.dir().display(),
            artifacts = artifacts.len(),
            "Aggregating artifacts"
        );

        self.remove_output()?;

        match self.write_all(&artifacts) {
            Ok(rows) => {
                info!(
                    output = %self.output.display(),
                    artifacts = artifacts.len(),
                    rows,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Aggregation complete"
                );
                Ok(AggregateSummary {
                    output: self.output.clone(),
                    artifacts: artifacts.len(),
                    rows,
                })
            },
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&self.output) {
                    warn!(output = %self.output.display(), error = %cleanup, "Could not remove partial output");
                }
                Err(e)
            },
        }
    }

    fn remove_output(&self) -> Result<()> {
        match std::fs::remove_file(&self.output) {
            Ok(()) => {
                debug!(output = %self.output.display(), "Removed previous aggregated output");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.output_error(e.into())),
        }
    }

    fn write_all(&self, artifacts: &[PathBuf]) -> Result<usize> {
        let file = File::create(&self.output).map_err(|e| self.output_error(e.into()))?;
        let mut writer = csv::Writer::from_writer(file);

        writer
            .write_record(OUTPUT_HEADER)
            .map_err(|e| self.output_error(e))?;

        let mut rows = 0;
        for path in artifacts {
            let response = read_artifact(path)?;
            for location in &response.locations {
                writer
                    .write_record(location_row(location))
                    .map_err(|e| self.output_error(e))?;
            }
            debug!(path = %path.display(), rows = response.locations.len(), "Flattened artifact");
            rows += response.locations.len();
        }

        writer
            .flush()
            .map_err(|e| self.output_error(e.into()))?;
        Ok(rows)
    }

    fn output_error(&self, source: csv::Error) -> GeobatchError {
        GeobatchError::OutputWrite {
            path: self.output.clone(),
            source,
        }
    }
}

fn read_artifact(path: &Path) -> Result<GeocodeResponse> {
    let raw = std::fs::read(path).map_err(|source| GeobatchError::ArtifactScan {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| GeobatchError::Schema {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location(result_id: i64, address: &str, x: f64, y: f64) -> serde_json::Value {
        json!({
            "address": address,
            "location": {"x": x, "y": y},
            "score": 100,
            "attributes": {
                "ResultID": result_id,
                "Loc_name": "World",
                "Status": "M",
                "Score": 100,
                "Match_addr": address,
                "Addr_type": "PointAddress",
                "Rank": 20,
                "StName": "Main",
                "City": "Springfield",
                "RegionAbbr": "IL",
                "Postal": "62701",
                "Distance": 0,
                "X": x,
                "Y": y,
                "DisplayX": x,
                "DisplayY": y,
                "Xmin": x - 0.001,
                "Xmax": x + 0.001,
                "Ymin": y - 0.001,
                "Ymax": y + 0.001
            }
        })
    }

    fn write_artifact(dir: &Path, name: &str, locations: Vec<serde_json::Value>) {
        let body = json!({
            "spatialReference": {"wkid": 4326, "latestWkid": 4326},
            "locations": locations
        });
        std::fs::write(dir.join(name), serde_json::to_vec_pretty(&body).unwrap()).unwrap();
    }

    fn read_rows(path: &Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader.headers().unwrap().clone();
        let rows = reader.records().map(|r| r.unwrap()).collect();
        (header, rows)
    }

    #[test]
    fn test_header_matches_row_width() {
        let row = location_row(&Location::default());
        assert_eq!(row.len(), OUTPUT_HEADER.len());
        assert_eq!(OUTPUT_HEADER[0], "resultid");
        assert_eq!(OUTPUT_HEADER[60], "exinfo");
    }

    #[test]
    fn test_float_formatting_is_shortest_round_trip() {
        assert_eq!(float(-89.6), "-89.6");
        assert_eq!(float(39.8), "39.8");
        assert_eq!(float(100.0), "100");
        assert_eq!(float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(float(-0.000001), "-0.000001");
    }

    #[test]
    fn test_single_match_scenario() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(
            dir.path(),
            "a.json",
            vec![location(42, "1 Main St, Springfield, IL, 62701", -89.6, 39.8)],
        );

        let summary = Aggregator::new(ArtifactStore::new(dir.path()))
            .aggregate()
            .unwrap();
        assert_eq!(summary.artifacts, 1);
        assert_eq!(summary.rows, 1);

        let text = std::fs::read_to_string(&summary.output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("resultid,address,cartesian_x,cartesian_y,"));
        assert!(lines[1].starts_with("42,\"1 Main St, Springfield, IL, 62701\",-89.6,39.8,"));
    }

    #[test]
    fn test_k_locations_produce_k_rows_with_values_copied() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(
            dir.path(),
            "one.json",
            vec![
                location(1, "10 Elm St", -120.5, 44.25),
                location(2, "20 Elm St", -120.75, 44.125),
            ],
        );
        write_artifact(dir.path(), "two.json", vec![location(3, "30 Elm St", -121.0, 45.0)]);
        write_artifact(dir.path(), "empty.json", vec![]);

        let summary = Aggregator::new(ArtifactStore::new(dir.path()))
            .aggregate()
            .unwrap();
        assert_eq!(summary.artifacts, 3);
        assert_eq!(summary.rows, 3);

        let (header, rows) = read_rows(&summary.output);
        assert_eq!(header.len(), 61);
        assert_eq!(rows.len(), 3);

        // Row order follows directory listing order, so look rows up by id
        let row = rows.iter().find(|r| &r[0] == "2").unwrap();
        assert_eq!(&row[1], "20 Elm St");
        assert_eq!(&row[2], "-120.75");
        assert_eq!(&row[3], "44.125");
        assert_eq!(&row[5], "M");
        assert_eq!(&row[6], "100");
        assert_eq!(&row[10], "PointAddress");
        assert_eq!(&row[16], "20");
        assert_eq!(&row[40], "Springfield");
        assert_eq!(&row[47], "62701");
        assert_eq!(&row[51], "0");
        assert_eq!(&row[52], "-120.75");
        assert_eq!(&row[14], "");

        let mut ids: Vec<String> = rows.iter().map(|r| r[0].to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_rerun_replaces_output() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "a.json", vec![location(1, "1 A St", 1.5, 2.5)]);
        let aggregator = Aggregator::new(ArtifactStore::new(dir.path()));

        aggregator.aggregate().unwrap();
        let first = std::fs::read_to_string(aggregator.output()).unwrap();
        let summary = aggregator.aggregate().unwrap();
        let second = std::fs::read_to_string(aggregator.output()).unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(first, second);
        assert_eq!(second.matches("resultid").count(), 1);
    }

    #[test]
    fn test_empty_directory_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let summary = Aggregator::new(ArtifactStore::new(dir.path()))
            .aggregate()
            .unwrap();
        assert_eq!(summary.rows, 0);

        let text = std::fs::read_to_string(&summary.output).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_schema_error_is_fatal_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "good.json", vec![location(1, "1 A St", 1.0, 2.0)]);
        std::fs::write(
            dir.path().join("bad.json"),
            r#"{"error": {"code": 500, "message": "Unable to complete operation."}}"#,
        )
        .unwrap();

        let aggregator = Aggregator::new(ArtifactStore::new(dir.path()));
        let err = aggregator.aggregate().unwrap_err();

        assert!(matches!(err, GeobatchError::Schema { ref path, .. } if path.ends_with("bad.json")));
        assert!(!aggregator.output().exists());
    }

    #[test]
    fn test_values_with_separators_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let mut loc = location(5, "5 \"Quoted\" Rd, Apt 2", 0.5, 0.25);
        loc["attributes"]["ExInfo"] = json!("line one\nline two");
        write_artifact(dir.path(), "q.json", vec![loc]);

        let summary = Aggregator::new(ArtifactStore::new(dir.path()))
            .aggregate()
            .unwrap();
        let (_, rows) = read_rows(&summary.output);
        assert_eq!(&rows[0][1], "5 \"Quoted\" Rd, Apt 2");
        assert_eq!(&rows[0][60], "line one\nline two");
    }
}
