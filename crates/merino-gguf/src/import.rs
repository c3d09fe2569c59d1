//! GGUF → native container import
//!
//! The importer runs a fixed pipeline: open the file, read its metadata,
//! enumerate the tensor table, validate every tensor's type against the
//! decoder registry, convert the accepted tensors, and emit a native
//! container. Validation is single-shot: all unsupported tensors are
//! collected into one [`GgufError::UnsupportedTensorTypes`] report
//! before the import fails, never just the first offender.

use std::path::Path;

use serde_json::json;
use tracing::{debug, info, warn};

use merino_container::{Container, ContainerWriter, Manifest};
use merino_quant::{DecoderRegistry, QuantizedTensor, Scheme, TensorShape};

use crate::error::Result;
use crate::error::GgufError;
use crate::loader::GgufFile;

/// Options controlling an import
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Display name recorded in the manifest; falls back to
    /// `general.name` from the GGUF metadata.
    pub model_name: Option<String>,

    /// Re-quantize accepted tensors to this scheme instead of carrying
    /// their source blocks over.
    ///
    /// Conversion decodes at the source scheme and re-encodes at the
    /// target, compounding a second rounding step on top of the original
    /// quantization error. This is the only lossy path in the importer;
    /// same-scheme imports are byte-exact copies. Float tensors (F32 and
    /// F16) are never re-quantized.
    pub target_scheme: Option<Scheme>,
}

/// Import a GGUF file into native container bytes using the default
/// decoder set.
pub fn import_gguf(bytes: &[u8], options: &ImportOptions) -> Result<Vec<u8>> {
    let registry = DecoderRegistry::with_default_decoders();
    import_gguf_with_registry(bytes, options, &registry)
}

/// Import using a caller-supplied decoder registry.
///
/// The registry's claim set defines which tensor types are accepted; a
/// registry extended with additional decoders widens the importable set
/// without any change here.
pub fn import_gguf_with_registry(
    bytes: &[u8],
    options: &ImportOptions,
    registry: &DecoderRegistry,
) -> Result<Vec<u8>> {
    // Open and read metadata.
    let gguf = GgufFile::from_bytes(bytes.to_vec())?;
    info!(
        tensors = gguf.tensor_names().len(),
        architecture = gguf.architecture().unwrap_or("unknown"),
        "importing GGUF model"
    );

    // Enumerate and validate every tensor's type before touching data.
    let mut offenders: Vec<(String, u32)> = Vec::new();
    for name in gguf.tensor_names() {
        let info = &gguf.tensors()[name];
        if !registry.supports(info.type_tag) {
            offenders.push((name.clone(), info.type_tag));
        }
    }
    if !offenders.is_empty() {
        warn!(count = offenders.len(), "rejecting unsupported tensor types");
        return Err(GgufError::UnsupportedTensorTypes(offenders));
    }

    // Convert accepted tensors and emit the container.
    let mut metadata = gguf.metadata().to_json();
    if let Some(map) = metadata.as_object_mut() {
        map.insert("import.source".to_string(), json!("gguf"));
        map.insert(
            "import.gguf_version".to_string(),
            json!(gguf.header().version.0),
        );
    }
    let mut writer = ContainerWriter::new().with_metadata(metadata);

    for name in gguf.tensor_names() {
        let info = &gguf.tensors()[name];
        let mut dims: Vec<usize> = info.dims.iter().map(|&d| d as usize).collect();
        dims.reverse(); // GGUF keeps the innermost axis first; native keeps it last

        let data = gguf.tensor_data(name)?;
        let tensor = convert_tensor(name, info.type_tag, dims, &data, options, registry)?;
        debug!(
            name = name.as_str(),
            scheme = tensor.scheme().name(),
            "converted tensor"
        );
        writer.add_tensor(name, tensor)?;
    }

    Ok(writer.write()?)
}

fn convert_tensor(
    name: &str,
    type_tag: u32,
    dims: Vec<usize>,
    data: &[u8],
    options: &ImportOptions,
    registry: &DecoderRegistry,
) -> Result<QuantizedTensor> {
    let source = Scheme::from_u32(type_tag).ok();
    let target = match (options.target_scheme, source) {
        // Float tensors always carry over unchanged.
        (_, Some(Scheme::F32)) => Some(Scheme::F32),
        (_, Some(Scheme::F16)) => Some(Scheme::F16),
        (Some(t), _) => Some(t),
        (None, s) => s,
    };

    match (source, target) {
        // Same scheme: byte-exact carry-over.
        (Some(s), Some(t)) if s == t => {
            Ok(QuantizedTensor::from_raw(s, dims, data.to_vec(), Vec::new())?)
        }
        // Scheme change: decode through the registry, re-encode at the
        // target. Lossy; see `ImportOptions::target_scheme`.
        (_, Some(t)) => {
            let shape = TensorShape::new(name, dims.clone());
            let values = registry.decode(type_tag, &shape, data)?;
            Ok(QuantizedTensor::quantize(&values, &dims, t)?)
        }
        // The tag is registry-decodable but has no native scheme and no
        // target was requested: store the decoded floats.
        (None, None) => {
            let shape = TensorShape::new(name, dims.clone());
            let values = registry.decode(type_tag, &shape, data)?;
            Ok(QuantizedTensor::quantize(&values, &dims, Scheme::F32)?)
        }
        (Some(_), None) => unreachable!("target defaults to source scheme"),
    }
}

/// Import a GGUF file from disk, writing the container and its sidecar
/// manifest next to `output_path`.
pub fn import_gguf_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    options: &ImportOptions,
) -> Result<Manifest> {
    let bytes = std::fs::read(&input_path)?;
    let gguf_name = {
        let gguf = GgufFile::from_bytes(bytes.clone())?;
        gguf.model_name().map(str::to_string)
    };

    let container_bytes = import_gguf(&bytes, options)?;
    std::fs::write(&output_path, &container_bytes)?;

    let container = Container::from_bytes(container_bytes)?;
    let manifest = Manifest::for_container(
        &container,
        options.model_name.clone().or(gguf_name),
    );
    manifest.save(&output_path)?;

    info!(
        input = %input_path.as_ref().display(),
        output = %output_path.as_ref().display(),
        tensors = manifest.tensor_count,
        "import complete"
    );
    Ok(manifest)
}
