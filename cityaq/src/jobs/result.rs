//! Gridded simulation output.

use serde::{Deserialize, Serialize};

use super::JobError;
use crate::codec::{CacheCodec, CodecError};
use crate::geom::geojson::FeatureCollection;
use crate::geom::Polygon;
use crate::types::Emission;

/// Name of the result file in a finished job's output.
pub const OUTPUT_FILE: &str = "OutputFile.geojson";

const POPULATION: &str = "pop";
const PRIMARY_PM25: &str = "PrimPM25";
const SOA: &str = "SOA";
const PNH4: &str = "pNH4";
const PNO3: &str = "pNO3";
const PSO4: &str = "pSO4";

/// Population and concentrations on the model's output grid.
///
/// Every array is index-aligned with `grid`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub grid: Vec<Polygon>,
    pub population: Vec<f64>,
    pub primary_pm25: Vec<f64>,
    pub soa: Vec<f64>,
    pub pnh4: Vec<f64>,
    pub pno3: Vec<f64>,
    pub pso4: Vec<f64>,
}

impl SimulationResult {
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Concentration field resulting from emissions of `emission`.
    ///
    /// `None` for [`Emission::Unspecified`].
    pub fn concentrations(&self, emission: Emission) -> Option<&[f64]> {
        match emission {
            Emission::PM2_5 => Some(&self.primary_pm25),
            Emission::NH3 => Some(&self.pnh4),
            Emission::NOx => Some(&self.pno3),
            Emission::SOx => Some(&self.pso4),
            Emission::VOC => Some(&self.soa),
            Emission::Unspecified => None,
        }
    }

    /// Decode the model's GeoJSON output, keeping feature order.
    ///
    /// An output without grid cells is an error.
    pub fn from_geojson(data: &[u8]) -> Result<Self, JobError> {
        let collection: FeatureCollection = serde_json::from_slice(data)?;
        let n = collection.features.len();
        if n == 0 {
            return Err(JobError::Output("simulation output has no grid cells".into()));
        }
        let mut out = SimulationResult {
            grid: Vec::with_capacity(n),
            population: Vec::with_capacity(n),
            primary_pm25: Vec::with_capacity(n),
            soa: Vec::with_capacity(n),
            pnh4: Vec::with_capacity(n),
            pno3: Vec::with_capacity(n),
            pso4: Vec::with_capacity(n),
        };

        for (i, feature) in collection.features.iter().enumerate() {
            let cell = feature
                .geometry
                .as_ref()
                .and_then(|g| g.to_polygon())
                .ok_or_else(|| JobError::Output(format!("feature {i} is not a polygon")))?;
            let column = |name: &str| {
                feature
                    .number(name)
                    .ok_or_else(|| JobError::Output(format!("feature {i} has no numeric {name}")))
            };
            out.population.push(column(POPULATION)?);
            out.primary_pm25.push(column(PRIMARY_PM25)?);
            out.soa.push(column(SOA)?);
            out.pnh4.push(column(PNH4)?);
            out.pno3.push(column(PNO3)?);
            out.pso4.push(column(PSO4)?);
            out.grid.push(cell);
        }
        Ok(out)
    }
}

impl CacheCodec for SimulationResult {
    const MAGIC: [u8; 4] = *b"CAQS";
    const VERSION: u16 = 1;

    fn validate(&self) -> Result<(), CodecError> {
        let n = self.grid.len();
        if n == 0 {
            return Err(CodecError::Invalid("result has no grid cells".into()));
        }
        let columns = [
            ("population", self.population.len()),
            ("primary_pm25", self.primary_pm25.len()),
            ("soa", self.soa.len()),
            ("pnh4", self.pnh4.len()),
            ("pno3", self.pno3.len()),
            ("pso4", self.pso4.len()),
        ];
        for (name, len) in columns {
            if len != n {
                return Err(CodecError::Invalid(format!(
                    "{name} has {len} values for {n} grid cells"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;

    fn sample() -> SimulationResult {
        SimulationResult {
            grid: vec![
                Polygon::rect(Point::new(0.0, 0.0), Point::new(1.0, 1.0)),
                Polygon::rect(Point::new(1.0, 0.0), Point::new(2.0, 1.0)),
            ],
            population: vec![10.0, 20.0],
            primary_pm25: vec![0.1, 0.2],
            soa: vec![0.3, 0.4],
            pnh4: vec![0.5, 0.6],
            pno3: vec![0.7, 0.8],
            pso4: vec![0.9, 1.0],
        }
    }

    #[test]
    fn test_codec_roundtrip() {
        let r = sample();
        let bytes = r.encode().unwrap();
        assert_eq!(&bytes[..4], b"CAQS");
        assert_eq!(SimulationResult::decode(&bytes).unwrap(), r);
    }

    #[test]
    fn test_misaligned_result_rejected() {
        let mut r = sample();
        r.pso4.pop();
        let err = r.encode().unwrap_err();
        assert!(err.to_string().contains("pso4"), "{err}");
    }

    #[test]
    fn test_concentration_selection() {
        let r = sample();
        assert_eq!(r.concentrations(Emission::PM2_5), Some(&[0.1, 0.2][..]));
        assert_eq!(r.concentrations(Emission::NH3), Some(&[0.5, 0.6][..]));
        assert_eq!(r.concentrations(Emission::NOx), Some(&[0.7, 0.8][..]));
        assert_eq!(r.concentrations(Emission::SOx), Some(&[0.9, 1.0][..]));
        assert_eq!(r.concentrations(Emission::VOC), Some(&[0.3, 0.4][..]));
        assert_eq!(r.concentrations(Emission::Unspecified), None);
    }

    #[test]
    fn test_from_geojson_keeps_row_order() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"pop":5,"mort":0.01,"PrimPM25":1.5,"SOA":0,"pNH4":0,"pNO3":0,"pSO4":0},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type":"Feature","properties":{"pop":7,"mort":0.01,"PrimPM25":2.5,"SOA":0,"pNH4":0,"pNO3":0,"pSO4":0},
             "geometry":{"type":"Polygon","coordinates":[[[1,0],[2,0],[2,1],[1,1],[1,0]]]}}]}"#;
        let r = SimulationResult::from_geojson(json.as_bytes()).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.population, vec![5.0, 7.0]);
        assert_eq!(r.primary_pm25, vec![1.5, 2.5]);
        assert_eq!(r.grid[1].rings[0][0], Point::new(1.0, 0.0));
    }

    #[test]
    fn test_empty_output_rejected() {
        let json = r#"{"type":"FeatureCollection","features":[]}"#;
        let err = SimulationResult::from_geojson(json.as_bytes()).unwrap_err();
        assert!(matches!(err, JobError::Output(ref m) if m.contains("no grid cells")));

        let err = SimulationResult::default().encode().unwrap_err();
        assert!(matches!(err, CodecError::Invalid(_)));
    }

    #[test]
    fn test_from_geojson_missing_column() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"pop":5},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;
        let err = SimulationResult::from_geojson(json.as_bytes()).unwrap_err();
        assert!(matches!(err, JobError::Output(ref m) if m.contains("PrimPM25")));
    }
}
