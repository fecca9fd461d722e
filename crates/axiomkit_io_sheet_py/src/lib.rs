use std::path::PathBuf;
use std::sync::Arc;

use axiomkit_io_sheet::spec::{
    EnumCellValue, EnumDatePolicy, EnumFileNamePolicy, EnumSheetFileType, SheetExportError,
    SpecCellFormat, SpecHeaderNode, SpecSheetExportOptions, TypeFlatRecord,
};
use axiomkit_io_sheet::util::{parse_cell_value, parse_sheet};
use axiomkit_io_sheet::{ReportSheetBuild, SheetExporter as RsSheetExporter};
use pyo3::exceptions::{PyOSError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBool, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};
use serde_json::{Map, Number, Value};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "axiomkit.sheet.exporter.v1";

#[pyclass(name = "SheetExporter")]
struct PySheetExporter {
    inner: RsSheetExporter,
}

#[pymethods]
impl PySheetExporter {
    #[new]
    #[pyo3(signature = (file_type = "xlsx", num_workers_max = None, csv_delimiter = ","))]
    fn new(file_type: &str, num_workers_max: Option<usize>, csv_delimiter: &str) -> PyResult<Self> {
        let file_type = file_type
            .parse::<EnumSheetFileType>()
            .map_err(PyValueError::new_err)?;
        let csv_delimiter = match csv_delimiter.as_bytes() {
            [n_byte] if n_byte.is_ascii() => *n_byte,
            _ => {
                return Err(PyValueError::new_err(format!(
                    "csv_delimiter must be a single ASCII character; got {csv_delimiter:?}."
                )));
            }
        };

        let options = SpecSheetExportOptions {
            file_type,
            num_workers_max,
            csv_delimiter,
        };
        Ok(Self {
            inner: RsSheetExporter::new(options),
        })
    }

    #[getter]
    fn file_type(&self) -> &'static str {
        self.inner.options().file_type.extension()
    }

    fn xlsx(mut slf: PyRefMut<'_, Self>) -> PyRefMut<'_, Self> {
        slf.inner.xlsx();
        slf
    }

    fn xls(mut slf: PyRefMut<'_, Self>) -> PyRefMut<'_, Self> {
        slf.inner.xls();
        slf
    }

    fn csv(mut slf: PyRefMut<'_, Self>) -> PyRefMut<'_, Self> {
        slf.inner.csv();
        slf
    }

    #[pyo3(signature = (header, data, config = None, formatters = None, customs = None))]
    fn add_sheet<'py>(
        mut slf: PyRefMut<'py, Self>,
        header: &Bound<'py, PyAny>,
        data: &Bound<'py, PyAny>,
        config: Option<&Bound<'py, PyAny>>,
        formatters: Option<&Bound<'py, PyDict>>,
        customs: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<PyRefMut<'py, Self>> {
        let mut dict_sheet = Map::new();
        dict_sheet.insert("header".to_string(), derive_json_from_py(header)?);
        dict_sheet.insert("data".to_string(), derive_json_from_py(data)?);
        if let Some(config) = config {
            dict_sheet.insert("config".to_string(), derive_json_from_py(config)?);
        }
        let mut sheet = parse_sheet(&Value::Object(dict_sheet)).map_err(derive_py_err)?;

        if let Some(formatters) = formatters {
            for (key, callable) in formatters.iter() {
                let field = key.extract::<String>()?;
                let node = find_leaf_mut(&mut sheet.header, &field).ok_or_else(|| {
                    PyValueError::new_err(format!("formatters: no leaf column {field:?}."))
                })?;
                let callable = validate_callable(&callable, "formatters")?;
                node.config = std::mem::take(&mut node.config).with_formatter(
                    move |value, record, _sheet| {
                        Python::with_gil(|py| {
                            let py_value = derive_py_from_cell_value(py, value)?;
                            let py_record = derive_py_dict_from_record(py, record)?;
                            let res = callable.bind(py).call1((py_value, py_record))?;
                            derive_cell_value_from_py(&res)
                        })
                        .map_err(|err| err.to_string())
                    },
                );
            }
        }

        if let Some(customs) = customs {
            for (key, callable) in customs.iter() {
                let field = key.extract::<String>()?;
                let node = find_leaf_mut(&mut sheet.header, &field).ok_or_else(|| {
                    PyValueError::new_err(format!("customs: no leaf column {field:?}."))
                })?;
                let callable = validate_callable(&callable, "customs")?;
                node.config = std::mem::take(&mut node.config).with_custom(
                    move |sheet, value, record, row, col| {
                        let patch = Python::with_gil(|py| {
                            let py_value = derive_py_from_cell_value(py, value)?;
                            let py_record = derive_py_dict_from_record(py, record)?;
                            let res = callable.bind(py).call1((py_value, py_record, row, col))?;
                            if res.is_none() {
                                return Ok(None);
                            }
                            let dict_patch = res.downcast::<PyDict>().map_err(|_| {
                                PyTypeError::new_err("customs must return None or a format dict.")
                            })?;
                            parse_spec_cell_format(dict_patch).map(Some)
                        })
                        .map_err(|err| err.to_string())?;

                        match patch {
                            Some(patch) if !patch.is_empty() => {
                                sheet.set_cell_format(col, row, &patch)
                            }
                            _ => Ok(()),
                        }
                    },
                );
            }
        }

        slf.inner.add_sheet(sheet);
        Ok(slf)
    }

    fn build(&mut self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let inner = &mut self.inner;
        py.allow_threads(|| {
            inner.build();
        });
        derive_py_report(py, self.inner.report())
    }

    fn report(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        derive_py_report(py, self.inner.report())
    }

    #[pyo3(signature = (root = ".", date = None, file_name = None))]
    fn export(
        &self,
        py: Python<'_>,
        root: &str,
        date: Option<&Bound<'_, PyAny>>,
        file_name: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Py<PyAny>> {
        let date_policy = parse_date_policy(date)?;
        let file_name_policy = parse_file_name_policy(file_name)?;

        let spec_path = self
            .inner
            .export(PathBuf::from(root), date_policy, file_name_policy)
            .map_err(derive_py_err)?;

        let dict_out = PyDict::new(py);
        dict_out.set_item("root", spec_path.root.to_string_lossy().to_string())?;
        dict_out.set_item("date", spec_path.date)?;
        dict_out.set_item("file", spec_path.file)?;
        dict_out.set_item("type", spec_path.file_type.extension())?;
        dict_out.set_item("full", spec_path.full_path.to_string_lossy().to_string())?;
        Ok(dict_out.into_any().unbind())
    }
}

fn derive_py_err(err: SheetExportError) -> PyErr {
    match err {
        SheetExportError::Structural { .. } | SheetExportError::Configuration { .. } => {
            PyValueError::new_err(err.to_string())
        }
        SheetExportError::Io { .. } => PyOSError::new_err(err.to_string()),
        SheetExportError::Callback { .. } | SheetExportError::Write { .. } => {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

fn derive_py_report(py: Python<'_>, report: &ReportSheetBuild) -> PyResult<Py<PyAny>> {
    let mut l_sheet_obj = Vec::with_capacity(report.sheets.len());
    for sheet in &report.sheets {
        let dict_sheet = PyDict::new(py);
        dict_sheet.set_item("sheet_idx", sheet.sheet_idx)?;
        dict_sheet.set_item("sheet_name", sheet.sheet_name.as_str())?;
        dict_sheet.set_item("cnt_header_rows", sheet.cnt_header_rows)?;
        dict_sheet.set_item("cnt_columns", sheet.cnt_columns)?;
        dict_sheet.set_item("cnt_records", sheet.cnt_records)?;
        dict_sheet.set_item("cnt_header_merges", sheet.cnt_header_merges)?;
        dict_sheet.set_item("cnt_data_merges", sheet.cnt_data_merges)?;
        dict_sheet.set_item("if_data_merges_applied", sheet.if_data_merges_applied)?;
        l_sheet_obj.push(dict_sheet);
    }
    let l_errors: Vec<String> = report.errors.iter().map(|err| err.to_string()).collect();

    let dict_report = PyDict::new(py);
    dict_report.set_item("sheets", PyList::new(py, l_sheet_obj)?)?;
    dict_report.set_item("errors", l_errors)?;
    dict_report.set_item("warnings", report.warnings.clone())?;
    dict_report.set_item("summary", report.to_string())?;
    Ok(dict_report.into_any().unbind())
}

fn find_leaf_mut<'a>(
    nodes: &'a mut [SpecHeaderNode],
    field: &str,
) -> Option<&'a mut SpecHeaderNode> {
    for node in nodes.iter_mut() {
        if node.children.is_none() {
            if node.field.as_deref() == Some(field) {
                return Some(node);
            }
            continue;
        }
        if let Some(l_children) = node.children.as_mut()
            && let Some(found) = find_leaf_mut(l_children, field)
        {
            return Some(found);
        }
    }
    None
}

fn validate_callable(obj: &Bound<'_, PyAny>, c_arg: &str) -> PyResult<Py<PyAny>> {
    if !obj.is_callable() {
        return Err(PyTypeError::new_err(format!(
            "{c_arg} values must be callable."
        )));
    }
    Ok(obj.clone().unbind())
}

fn parse_date_policy(obj: Option<&Bound<'_, PyAny>>) -> PyResult<EnumDatePolicy> {
    let Some(obj) = obj else {
        return Ok(EnumDatePolicy::Today);
    };
    if obj.is_none() {
        return Ok(EnumDatePolicy::Today);
    }
    if let Ok(val) = obj.downcast::<PyBool>() {
        return Ok(if val.is_true() {
            EnumDatePolicy::Today
        } else {
            EnumDatePolicy::None
        });
    }
    if let Ok(val) = obj.downcast::<PyString>() {
        return Ok(EnumDatePolicy::Pattern(val.to_str()?.to_string()));
    }
    let callable = validate_callable(obj, "date")?;
    Ok(EnumDatePolicy::Custom(Arc::new(move || {
        Python::with_gil(|py| callable.bind(py).call0()?.extract::<String>())
            .map_err(|err| err.to_string())
    })))
}

fn parse_file_name_policy(obj: Option<&Bound<'_, PyAny>>) -> PyResult<EnumFileNamePolicy> {
    let Some(obj) = obj else {
        return Ok(EnumFileNamePolicy::Timestamp);
    };
    if obj.is_none() {
        return Ok(EnumFileNamePolicy::Timestamp);
    }
    if let Ok(val) = obj.downcast::<PyString>() {
        return Ok(EnumFileNamePolicy::Name(val.to_str()?.to_string()));
    }
    let callable = validate_callable(obj, "file_name")?;
    Ok(EnumFileNamePolicy::Custom(Arc::new(move || {
        Python::with_gil(|py| callable.bind(py).call0()?.extract::<String>())
            .map_err(|err| err.to_string())
    })))
}

fn parse_spec_cell_format(dict: &Bound<'_, PyDict>) -> PyResult<SpecCellFormat> {
    Ok(SpecCellFormat {
        font_name: extract_optional_item::<String>(dict, "font_name")?,
        font_size: extract_optional_item::<i64>(dict, "font_size")?,
        bold: extract_optional_item::<bool>(dict, "bold")?,
        italic: extract_optional_item::<bool>(dict, "italic")?,
        align: extract_optional_item::<String>(dict, "align")?,
        valign: extract_optional_item::<String>(dict, "valign")?,
        border: extract_optional_item::<i64>(dict, "border")?,
        text_wrap: extract_optional_item::<bool>(dict, "text_wrap")?,
        num_format: extract_optional_item::<String>(dict, "num_format")?,
        bg_color: extract_optional_item::<String>(dict, "bg_color")?,
        font_color: extract_optional_item::<String>(dict, "font_color")?,
    })
}

fn extract_optional_item<T>(dict: &Bound<'_, PyDict>, key: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    match dict.get_item(key)? {
        Some(val) if !val.is_none() => Ok(Some(val.extract::<T>()?)),
        _ => Ok(None),
    }
}

fn derive_json_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    if let Ok(val) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(val.is_true()));
    }
    if obj.is_instance_of::<PyInt>() {
        if let Ok(n_val) = obj.extract::<i64>() {
            return Ok(Value::Number(Number::from(n_val)));
        }
        return derive_json_number(obj.extract::<f64>()?);
    }
    if obj.is_instance_of::<PyFloat>() {
        return derive_json_number(obj.extract::<f64>()?);
    }
    if let Ok(val) = obj.downcast::<PyString>() {
        return Ok(Value::String(val.to_str()?.to_string()));
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut dict_out = Map::new();
        for (key, val) in dict.iter() {
            dict_out.insert(key.str()?.to_str()?.to_string(), derive_json_from_py(&val)?);
        }
        return Ok(Value::Object(dict_out));
    }
    if obj.is_instance_of::<PyList>() || obj.is_instance_of::<PyTuple>() {
        let mut l_values = Vec::new();
        for val in obj.try_iter()? {
            l_values.push(derive_json_from_py(&val?)?);
        }
        return Ok(Value::Array(l_values));
    }
    Err(PyTypeError::new_err(format!(
        "Unsupported value type: {}.",
        obj.get_type().name()?
    )))
}

fn derive_json_number(n_val: f64) -> PyResult<Value> {
    Number::from_f64(n_val)
        .map(Value::Number)
        .ok_or_else(|| PyValueError::new_err(format!("Non-finite number is not supported: {n_val}.")))
}

fn derive_cell_value_from_py(obj: &Bound<'_, PyAny>) -> PyResult<EnumCellValue> {
    let value = derive_json_from_py(obj)?;
    parse_cell_value(&value, "formatter result").map_err(derive_py_err)
}

fn derive_py_from_cell_value(py: Python<'_>, value: &EnumCellValue) -> PyResult<Py<PyAny>> {
    let obj = match value {
        EnumCellValue::None => py.None(),
        EnumCellValue::String(val) => PyString::new(py, val).into_any().unbind(),
        EnumCellValue::Number(val) => {
            if val.is_finite() && val.fract() == 0.0 && val.abs() < 9.0e15 {
                (*val as i64).into_pyobject(py)?.into_any().unbind()
            } else {
                PyFloat::new(py, *val).into_any().unbind()
            }
        }
        EnumCellValue::Boolean(val) => PyBool::new(py, *val).to_owned().into_any().unbind(),
    };
    Ok(obj)
}

fn derive_py_dict_from_record(py: Python<'_>, record: &TypeFlatRecord) -> PyResult<Py<PyAny>> {
    let dict_record = PyDict::new(py);
    for (key, val) in record {
        dict_record.set_item(key, derive_py_from_cell_value(py, val)?)?;
    }
    Ok(dict_record.into_any().unbind())
}

#[pymodule]
fn _axiomkit_io_sheet_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PySheetExporter>()?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    Ok(())
}
