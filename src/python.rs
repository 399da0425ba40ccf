//! Python bindings used by the dashboards

use crate::core::presets;
use crate::core::reclassify::Reclassifier;
use crate::core::scheme::{ClassificationScheme, UnmappedPolicy};
use crate::core::trend::TimeSeriesAnalyzer;
use crate::core::zonal::ZonalAggregator;
use crate::io::raster::{Band, GridGeometry};
use crate::io::region::RegionOfInterest;
use crate::types::{ClassIndex, Crs, ErrorKind, GeoTransform, LandCoverError, RawCode, Year};
use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyLookupError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::BTreeMap;

fn to_py_err(err: LandCoverError) -> PyErr {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::ConfigError | ErrorKind::GeometryError => PyValueError::new_err(message),
        ErrorKind::DataUnavailableError => PyLookupError::new_err(message),
        ErrorKind::ComputationError | ErrorKind::ExternalServiceError => PyRuntimeError::new_err(message),
    }
}

fn parse_policy(policy: &str, sentinel: Option<ClassIndex>) -> PyResult<UnmappedPolicy> {
    match policy.to_lowercase().as_str() {
        "reject" => Ok(UnmappedPolicy::Reject),
        "passthrough" => Ok(UnmappedPolicy::Passthrough),
        "sentinel" => sentinel
            .map(UnmappedPolicy::MapToSentinelClass)
            .ok_or_else(|| PyValueError::new_err("policy 'sentinel' needs a sentinel class")),
        _ => Err(PyValueError::new_err(format!("Invalid unmapped policy: {}", policy))),
    }
}

/// Python wrapper for ClassificationScheme
#[pyclass(name = "ClassificationScheme")]
struct PyScheme {
    inner: ClassificationScheme,
}

#[pymethods]
impl PyScheme {
    /// Scheme from its JSON form (`codes`, `new_classes`, `palette`, `names`)
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let inner = ClassificationScheme::from_json_str(json).map_err(to_py_err)?;
        Ok(PyScheme { inner })
    }

    #[staticmethod]
    #[pyo3(signature = (policy = "reject", sentinel = None, with_nodata = false))]
    fn mapbiomas(policy: &str, sentinel: Option<ClassIndex>, with_nodata: bool) -> PyResult<Self> {
        let policy = parse_policy(policy, sentinel)?;
        let inner = if with_nodata {
            presets::mapbiomas_collection9_with_nodata(policy)
        } else {
            presets::mapbiomas_collection9(policy)
        }
        .map_err(to_py_err)?;
        Ok(PyScheme { inner })
    }

    fn lookup(&self, code: RawCode) -> PyResult<ClassIndex> {
        self.inner.lookup(code).map_err(to_py_err)
    }

    fn class_indices(&self) -> Vec<ClassIndex> {
        self.inner.class_indices()
    }

    fn name(&self, class_index: ClassIndex) -> String {
        self.inner.display_name(class_index)
    }

    fn color(&self, class_index: ClassIndex) -> Option<String> {
        self.inner.color(class_index).map(str::to_string)
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner.to_spec())
            .map_err(|e| PyValueError::new_err(format!("{}", e)))
    }

    fn __repr__(&self) -> String {
        format!(
            "ClassificationScheme(codes={}, classes={:?})",
            self.inner.codes().len(),
            self.inner.class_indices()
        )
    }
}

fn band_from_numpy(year: Year, codes: PyReadonlyArray2<u16>, geotransform: [f64; 6], crs: &str) -> PyResult<Band> {
    let codes = codes.as_array().to_owned();
    let (rows, cols) = codes.dim();
    let crs = Crs::parse(crs).map_err(to_py_err)?;
    let grid = GridGeometry::new(rows, cols, GeoTransform::from_gdal(geotransform), crs);
    Band::new(year, codes, grid).map_err(to_py_err)
}

/// Remap a grid of raw codes through a scheme
#[pyfunction]
fn reclassify<'py>(
    py: Python<'py>,
    scheme: &PyScheme,
    codes: PyReadonlyArray2<u16>,
    geotransform: [f64; 6],
    crs: &str,
) -> PyResult<&'py PyArray2<u16>> {
    let band = band_from_numpy(0, codes, geotransform, crs)?;
    let remapped = Reclassifier::new(&scheme.inner).reclassify(&band).map_err(to_py_err)?;
    Ok(remapped.classes().to_pyarray(py))
}

/// Area in km² per class of a grid of raw codes inside a GeoJSON region
#[pyfunction]
#[pyo3(signature = (scheme, codes, geotransform, crs, region_geojson, classes = None))]
fn area_by_class(
    scheme: &PyScheme,
    codes: PyReadonlyArray2<u16>,
    geotransform: [f64; 6],
    crs: &str,
    region_geojson: &str,
    classes: Option<Vec<ClassIndex>>,
) -> PyResult<BTreeMap<ClassIndex, f64>> {
    let band = band_from_numpy(0, codes, geotransform, crs)?;
    let region = RegionOfInterest::from_geojson(region_geojson, band.grid().crs()).map_err(to_py_err)?;
    let classes = classes.unwrap_or_else(|| scheme.inner.class_indices());

    let remapped = Reclassifier::new(&scheme.inner).reclassify(&band).map_err(to_py_err)?;
    ZonalAggregator::new()
        .compute_area_by_class(&remapped, &region, &classes)
        .map_err(to_py_err)
}

/// Linear trend of a yearly series as a dict
#[pyfunction]
fn fit_trend(py: Python, years: Vec<Year>, values: Vec<f64>) -> PyResult<PyObject> {
    if years.len() != values.len() {
        return Err(PyValueError::new_err(format!(
            "years and values differ in length ({} vs {})",
            years.len(),
            values.len()
        )));
    }
    let points: Vec<(Year, f64)> = years.into_iter().zip(values).collect();
    let trend = TimeSeriesAnalyzer::fit_trend(&points).map_err(to_py_err)?;

    let result = PyDict::new(py);
    result.set_item("slope", trend.slope)?;
    result.set_item("intercept", trend.intercept)?;
    result.set_item("r_squared", trend.r_squared)?;
    result.set_item("p_value", trend.p_value)?;
    result.set_item("std_err", trend.std_err)?;
    result.set_item("total_change", trend.total_change)?;
    result.set_item("base_year", trend.base_year)?;
    Ok(result.into())
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyScheme>()?;
    m.add_function(wrap_pyfunction!(reclassify, m)?)?;
    m.add_function(wrap_pyfunction!(area_by_class, m)?)?;
    m.add_function(wrap_pyfunction!(fit_trend, m)?)?;
    Ok(())
}
