//! Request and response bodies of the `geocodeAddresses` operation

use crate::ingest::AddressRecord;
use serde::{Deserialize, Deserializer, Serialize};

/// `addresses` form field: `{"records": [{"attributes": {...}}, ...]}`
#[derive(Debug, Serialize)]
pub struct AddressTable<'a> {
    pub records: Vec<AddressRow<'a>>,
}

#[derive(Debug, Serialize)]
pub struct AddressRow<'a> {
    pub attributes: &'a AddressRecord,
}

impl<'a> AddressTable<'a> {
    pub fn new(records: &'a [AddressRecord]) -> Self {
        Self {
            records: records
                .iter()
                .map(|attributes| AddressRow { attributes })
                .collect(),
        }
    }
}

/// Treat an explicit JSON `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parsed body of one artifact
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResponse {
    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,
    /// Required: a body without it (e.g. an error payload) is rejected
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    #[serde(default, deserialize_with = "nullable")]
    pub wkid: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub latest_wkid: i64,
}

/// One candidate match
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Location {
    #[serde(default, deserialize_with = "nullable")]
    pub address: String,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Point,
    /// Match confidence, 0 to 100
    #[serde(default, deserialize_with = "nullable")]
    pub score: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub attributes: LocationAttributes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Point {
    #[serde(default, deserialize_with = "nullable")]
    pub x: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub y: f64,
}

/// Descriptive attributes returned with each match
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocationAttributes {
    #[serde(rename = "ResultID", deserialize_with = "nullable")]
    pub result_id: i64,
    #[serde(rename = "Loc_name", deserialize_with = "nullable")]
    pub loc_name: String,
    #[serde(rename = "Status", deserialize_with = "nullable")]
    pub status: String,
    #[serde(rename = "Score", deserialize_with = "nullable")]
    pub score: i64,
    #[serde(rename = "Match_addr", deserialize_with = "nullable")]
    pub match_addr: String,
    #[serde(rename = "LongLabel", deserialize_with = "nullable")]
    pub long_label: String,
    #[serde(rename = "ShortLabel", deserialize_with = "nullable")]
    pub short_label: String,
    #[serde(rename = "Addr_type", deserialize_with = "nullable")]
    pub addr_type: String,
    #[serde(rename = "Type", deserialize_with = "nullable")]
    pub kind: String,
    #[serde(rename = "PlaceName", deserialize_with = "nullable")]
    pub place_name: String,
    #[serde(rename = "Place_addr", deserialize_with = "nullable")]
    pub place_addr: String,
    #[serde(rename = "Phone", deserialize_with = "nullable")]
    pub phone: String,
    #[serde(rename = "URL", deserialize_with = "nullable")]
    pub url: String,
    #[serde(rename = "Rank", deserialize_with = "nullable")]
    pub rank: i64,
    #[serde(rename = "AddBldg", deserialize_with = "nullable")]
    pub add_bldg: String,
    #[serde(rename = "AddNum", deserialize_with = "nullable")]
    pub add_num: String,
    #[serde(rename = "AddNumFrom", deserialize_with = "nullable")]
    pub add_num_from: String,
    #[serde(rename = "AddNumTo", deserialize_with = "nullable")]
    pub add_num_to: String,
    #[serde(rename = "AddRange", deserialize_with = "nullable")]
    pub add_range: String,
    #[serde(rename = "Side", deserialize_with = "nullable")]
    pub side: String,
    #[serde(rename = "StPreDir", deserialize_with = "nullable")]
    pub st_pre_dir: String,
    #[serde(rename = "StPreType", deserialize_with = "nullable")]
    pub st_pre_type: String,
    #[serde(rename = "StName", deserialize_with = "nullable")]
    pub st_name: String,
    #[serde(rename = "StType", deserialize_with = "nullable")]
    pub st_type: String,
    #[serde(rename = "StDir", deserialize_with = "nullable")]
    pub st_dir: String,
    #[serde(rename = "BldgType", deserialize_with = "nullable")]
    pub bldg_type: String,
    #[serde(rename = "BldgName", deserialize_with = "nullable")]
    pub bldg_name: String,
    #[serde(rename = "LevelType", deserialize_with = "nullable")]
    pub level_type: String,
    #[serde(rename = "LevelName", deserialize_with = "nullable")]
    pub level_name: String,
    #[serde(rename = "UnitType", deserialize_with = "nullable")]
    pub unit_type: String,
    #[serde(rename = "UnitName", deserialize_with = "nullable")]
    pub unit_name: String,
    #[serde(rename = "SubAddr", deserialize_with = "nullable")]
    pub sub_addr: String,
    #[serde(rename = "StAddr", deserialize_with = "nullable")]
    pub st_addr: String,
    #[serde(rename = "Block", deserialize_with = "nullable")]
    pub block: String,
    #[serde(rename = "Sector", deserialize_with = "nullable")]
    pub sector: String,
    #[serde(rename = "Nbrhd", deserialize_with = "nullable")]
    pub nbrhd: String,
    #[serde(rename = "District", deserialize_with = "nullable")]
    pub district: String,
    #[serde(rename = "City", deserialize_with = "nullable")]
    pub city: String,
    #[serde(rename = "MetroArea", deserialize_with = "nullable")]
    pub metro_area: String,
    #[serde(rename = "Subregion", deserialize_with = "nullable")]
    pub subregion: String,
    #[serde(rename = "Region", deserialize_with = "nullable")]
    pub region: String,
    #[serde(rename = "RegionAbbr", deserialize_with = "nullable")]
    pub region_abbr: String,
    #[serde(rename = "Territory", deserialize_with = "nullable")]
    pub territory: String,
    #[serde(rename = "Zone", deserialize_with = "nullable")]
    pub zone: String,
    #[serde(rename = "Postal", deserialize_with = "nullable")]
    pub postal: String,
    #[serde(rename = "PostalExt", deserialize_with = "nullable")]
    pub postal_ext: String,
    #[serde(rename = "Country", deserialize_with = "nullable")]
    pub country: String,
    #[serde(rename = "LangCode", deserialize_with = "nullable")]
    pub lang_code: String,
    #[serde(rename = "Distance", deserialize_with = "nullable")]
    pub distance: i64,
    #[serde(rename = "X", deserialize_with = "nullable")]
    pub x: f64,
    #[serde(rename = "Y", deserialize_with = "nullable")]
    pub y: f64,
    #[serde(rename = "DisplayX", deserialize_with = "nullable")]
    pub display_x: f64,
    #[serde(rename = "DisplayY", deserialize_with = "nullable")]
    pub display_y: f64,
    #[serde(rename = "Xmin", deserialize_with = "nullable")]
    pub xmin: f64,
    #[serde(rename = "Xmax", deserialize_with = "nullable")]
    pub xmax: f64,
    #[serde(rename = "Ymin", deserialize_with = "nullable")]
    pub ymin: f64,
    #[serde(rename = "Ymax", deserialize_with = "nullable")]
    pub ymax: f64,
    #[serde(rename = "ExInfo", deserialize_with = "nullable")]
    pub ex_info: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let records = vec![AddressRecord {
            object_id: 1,
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip: "62701".to_string(),
        }];

        let json = serde_json::to_value(AddressTable::new(&records)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "records": [{
                    "attributes": {
                        "OBJECTID": 1,
                        "Street": "1 Main St",
                        "City": "Springfield",
                        "State": "IL",
                        "ZIP": "62701"
                    }
                }]
            })
        );
    }

    #[test]
    fn test_nulls_and_missing_fields_default() {
        let body = r#"{
            "spatialReference": {"wkid": 4326, "latestWkid": null},
            "locations": [{
                "address": "1 Main St, Springfield, IL",
                "location": {"x": -89.6, "y": 39.8},
                "score": 100,
                "attributes": {"ResultID": 42, "Phone": null, "Rank": 20}
            }]
        }"#;

        let response: GeocodeResponse = serde_json::from_str(body).unwrap();
        let spatial = response.spatial_reference.unwrap();
        assert_eq!(spatial.wkid, 4326);
        assert_eq!(spatial.latest_wkid, 0);

        let location = &response.locations[0];
        assert_eq!(location.score, 100);
        assert_eq!(location.location, Point { x: -89.6, y: 39.8 });
        assert_eq!(location.attributes.result_id, 42);
        assert_eq!(location.attributes.phone, "");
        assert_eq!(location.attributes.rank, 20);
        assert_eq!(location.attributes.city, "");
    }

    #[test]
    fn test_locations_key_is_required() {
        let body = r#"{"error": {"code": 498, "message": "Invalid token."}}"#;
        assert!(serde_json::from_str::<GeocodeResponse>(body).is_err());
    }

    #[test]
    fn test_unmatched_location_without_location_point() {
        let body = r#"{"locations": [{"address": "", "score": 0, "location": null,
                        "attributes": {"ResultID": 3, "Status": "U"}}]}"#;
        let response: GeocodeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.locations[0].location, Point::default());
        assert_eq!(response.locations[0].attributes.status, "U");
    }
}
