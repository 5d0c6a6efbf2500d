//! Build-time marshalling generator.
//!
//! Pipeline: pragmas and class declarations are read from each header,
//! turned into device descriptors, numbered by the table builder and
//! rendered into artifacts. Nothing is written unless every header
//! passed.

pub mod annotations;
pub mod codegen;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod header;
pub mod packs;
pub mod render;
pub mod table;
pub mod types;

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

pub use config::GeneratorConfig;
pub use descriptor::{DeviceDescriptor, IoType, OperationDescriptor};
pub use error::{GenError, GenResult};
pub use packs::{layout, OperationLayout};
pub use render::{Artifact, CppRenderer, Render};
pub use table::DeviceTable;

/// Devices declared in one header text, in declaration order.
pub fn parse_source(source: &str, origin: &str, namespace: &str) -> GenResult<Vec<DeviceDescriptor>> {
    let classes = header::parse_header(source, origin)?;
    if classes.is_empty() {
        return Err(GenError::Parse {
            origin: origin.to_string(),
            line: 1,
            reason: "no class declaration found".to_string(),
        });
    }
    let pragmas = annotations::extract_pragmas(source, namespace);
    classes
        .iter()
        .map(|class| descriptor::describe_class(class, &pragmas))
        .collect()
}

/// Result of one generation run.
#[derive(Debug)]
pub struct Generated {
    pub table: DeviceTable,
    pub artifacts: Vec<Artifact>,
}

/// Parse every header and render all artifacts in memory.
pub fn build(config: &GeneratorConfig, renderer: &dyn Render) -> GenResult<Generated> {
    let parsed: Vec<(String, Vec<DeviceDescriptor>)> = config
        .headers
        .par_iter()
        .map(|path| {
            let source = fs::read_to_string(path).map_err(|e| GenError::io(path, e))?;
            let devices = parse_source(&source, &path.display().to_string(), &config.pragma)?;
            Ok((include_name(path), devices))
        })
        .collect::<GenResult<_>>()?;

    let mut includes = Vec::new();
    let mut devices = Vec::new();
    for (include, devs) in parsed {
        for dev in devs {
            includes.push(include.clone());
            devices.push(dev);
        }
    }

    let table = DeviceTable::build(devices)?;
    let mut artifacts: Vec<Artifact> = table
        .user_devices()
        .iter()
        .zip(&includes)
        .flat_map(|(dev, include)| renderer.render_device(dev, include))
        .collect();
    artifacts.extend(renderer.render_table(&table)?);

    Ok(Generated { table, artifacts })
}

/// Full generator run with the C++ renderer.
pub fn generate(config: &GeneratorConfig) -> GenResult<Generated> {
    let generated = build(config, &CppRenderer)?;
    write_artifacts(&config.output_dir, &generated.artifacts)?;
    log::info!(
        "generated {} files for {} devices in {}",
        generated.artifacts.len(),
        generated.table.user_devices().len(),
        config.output_dir.display()
    );
    Ok(generated)
}

pub fn write_artifacts(dir: &Path, artifacts: &[Artifact]) -> GenResult<()> {
    fs::create_dir_all(dir).map_err(|e| GenError::io(dir, e))?;
    for artifact in artifacts {
        let path = dir.join(&artifact.path);
        fs::write(&path, &artifact.contents).map_err(|e| GenError::io(&path, e))?;
        log::debug!("wrote {}", path.display());
    }
    Ok(())
}

fn include_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_requires_class() {
        let err = parse_source("// nothing here\n", "empty.hpp", "devlink").unwrap_err();
        assert!(err.to_string().starts_with("empty.hpp:1:"));
    }

    #[test]
    fn test_classes_in_order() {
        let devices = parse_source(
            "class B { public: void f(); };\nclass A { public: void g(); };",
            "two.hpp",
            "devlink",
        )
        .unwrap();
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
