//! Wire types of the CDAS web service

use fetch_cache::FileDescriptor;
use serde::{Deserialize, Serialize};

/// Response of a data-file request: the files covering the requested interval
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataResult {
    #[serde(rename = "FileDescription", default)]
    pub file_description: Vec<FileDescriptor>,
}

impl DataResult {
    /// Parse either a full data result or a bare descriptor list / descriptor
    pub fn from_json(json: &str) -> serde_json::Result<Vec<FileDescriptor>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Single(FileDescriptor),
            List(Vec<FileDescriptor>),
            Result(DataResult),
        }

        Ok(match serde_json::from_str(json)? {
            Shape::Single(descriptor) => vec![descriptor],
            Shape::List(list) => list,
            Shape::Result(result) => result.file_description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_RESULT: &str = r#"{
        "FileDescription": [
            {
                "Name": "https://cdaweb.gsfc.nasa.gov/tmp/ws8HQb0g/ac_h0_mfi_20230101000000_20230102000000.cdf",
                "MimeType": "application/x-cdf",
                "StartTime": "2023-01-01T00:00:00.000Z",
                "EndTime": "2023-01-02T00:00:00.000Z",
                "Length": 1048576,
                "LastModified": "2023-05-01T12:30:00.000Z"
            }
        ]
    }"#;

    #[test]
    fn test_data_result_deserialization() {
        let result: DataResult = serde_json::from_str(DATA_RESULT).unwrap();
        assert_eq!(result.file_description.len(), 1);
        assert_eq!(result.file_description[0].length, 1048576);
        assert_eq!(result.file_description[0].mime_type, "application/x-cdf");
    }

    #[test]
    fn test_from_json_accepts_all_shapes() {
        assert_eq!(DataResult::from_json(DATA_RESULT).unwrap().len(), 1);

        let single = r#"{"Name": "https://example.org/tmp/a/b.cdf", "Length": 1, "LastModified": "2023-05-01T12:30:00Z"}"#;
        assert_eq!(DataResult::from_json(single).unwrap().len(), 1);

        let list = format!("[{},{}]", single, single);
        assert_eq!(DataResult::from_json(&list).unwrap().len(), 2);

        assert!(DataResult::from_json("{\"Other\": 1}").is_ok_and(|d| d.is_empty()));
        assert!(DataResult::from_json("not json").is_err());
    }
}
