//! Generator runs into temporary directories.

use std::fs;
use std::path::{Path, PathBuf};

use devlink::devgen::{self, GenError, GeneratorConfig};
use devlink::protocol::{Catalogue, DiscoveryTable, ReturnShape};

const MATH: &str = "#pragma once
#include <array>
#include <vector>

class Math {
  public:
    Math(Context& ctx);

    uint32_t add(uint32_t a, uint32_t b);
    bool set_buffer(const std::vector<uint32_t>& data);
    std::array<float, 4> window(uint16_t start);

    #pragma devlink exclude
    void internal_helper();

    #pragma devlink is_failed
    bool is_failed();

  private:
    uint32_t state;
};
";

const DEV_MEM: &str = "class DevMem {
  public:
    #pragma devlink write_array arg{data} arg{len}
    void write_buffer(uint32_t offset, const uint32_t* data, uint32_t len);

    #pragma devlink read_array this{size}
    const uint32_t* read_buffer(uint32_t offset);

    const char* name();

  private:
    uint32_t size;
};
";

fn write_headers(dir: &Path, headers: &[(&str, &str)]) -> Vec<PathBuf> {
    headers
        .iter()
        .map(|(name, text)| {
            let path = dir.join(name);
            fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

fn read_tree(dir: &Path) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read_to_string(&path).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_output_files() {
    let dir = tempfile::tempdir().unwrap();
    let headers = write_headers(dir.path(), &[("math.hpp", MATH), ("dev_mem.hpp", DEV_MEM)]);
    let out = dir.path().join("out");

    let generated = devgen::generate(&GeneratorConfig::new(&out, headers)).unwrap();
    let tags: Vec<&str> = generated.table.user_devices().iter().map(|d| d.tag.as_str()).collect();
    assert_eq!(tags, vec!["MATH", "DEV_MEM"]);

    let names: Vec<String> = read_tree(&out).into_iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec![
            "dev_mem_device.cpp",
            "dev_mem_device.hpp",
            "devices.json",
            "devices_table.hpp",
            "math_device.cpp",
            "math_device.hpp",
        ]
    );

    let source = fs::read_to_string(out.join("math_device.cpp")).unwrap();
    assert!(source.contains("Invalid payload size"));
    assert!(!source.contains("internal_helper"));

    let table = fs::read_to_string(out.join("devices_table.hpp")).unwrap();
    assert!(table.contains("#2:MATH:ADD:SET_BUFFER:WINDOW::"));
    assert!(table.contains("#3:DEV_MEM:WRITE_BUFFER:READ_BUFFER:NAME:"));

    let discovery = generated.table.discovery().render();
    let parsed = DiscoveryTable::parse(&discovery).unwrap();
    assert_eq!(parsed.device("DevMem").unwrap().get_op_ref("NAME"), Some(2));

    let catalogue = Catalogue::from_json(&fs::read_to_string(out.join("devices.json")).unwrap()).unwrap();
    let window = catalogue.find("Math", "window").unwrap();
    assert_eq!(
        window.returns,
        ReturnShape::Array {
            dtype: "float32".to_string(),
            len: 4
        }
    );
    assert_eq!(catalogue.find("DevMem", "read_buffer").unwrap().io_type, "READ_ARRAY");
}

#[test]
fn test_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let headers = write_headers(dir.path(), &[("math.hpp", MATH), ("dev_mem.hpp", DEV_MEM)]);

    let first = devgen::generate(&GeneratorConfig::new(dir.path().join("a"), headers.clone())).unwrap();
    let second = devgen::generate(&GeneratorConfig::new(dir.path().join("b"), headers)).unwrap();

    assert_eq!(read_tree(&dir.path().join("a")), read_tree(&dir.path().join("b")));
    assert_eq!(first.table.discovery(), second.table.discovery());
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("drivers")).unwrap();
    write_headers(&dir.path().join("drivers"), &[("math.hpp", MATH)]);
    let config_path = dir.path().join("devgen.toml");
    fs::write(
        &config_path,
        "output_dir = \"generated\"\nheaders = [\"drivers/math.hpp\"]\n",
    )
    .unwrap();

    let config = GeneratorConfig::load(&config_path).unwrap();
    devgen::generate(&config).unwrap();
    assert!(dir.path().join("generated/math_device.hpp").exists());
}

fn generate_one(source: &str) -> (tempfile::TempDir, Result<devgen::Generated, GenError>) {
    let dir = tempfile::tempdir().unwrap();
    let headers = write_headers(dir.path(), &[("math.hpp", MATH), ("bad.hpp", source)]);
    let result = devgen::generate(&GeneratorConfig::new(dir.path().join("out"), headers));
    (dir, result)
}

#[test]
fn test_errors_abort_the_build() {
    let cases = [
        "class Bad { public: void f(long x); };",
        "class Bad { public:\n    #pragma devlink is_failed\n    bool check(uint32_t x);\n};",
        "class Bad { public:\n    #pragma devlink frobnicate\n    void f();\n};",
        "class Bad { public:\n    #pragma devlink write_array arg{data}\n    void f(const uint32_t* data, uint32_t len);\n};",
        "class Bad { public: void f(const float* data, uint32_t len); };",
    ];

    for source in cases {
        let (dir, result) = generate_one(source);
        let err = result.err().unwrap();
        assert!(
            matches!(
                err,
                GenError::UnsupportedType { .. }
                    | GenError::InvalidIsFailed { .. }
                    | GenError::UnknownDirective { .. }
                    | GenError::MalformedDirective { .. }
                    | GenError::PointerArgument { .. }
            ),
            "{}: {}",
            source,
            err
        );
        // Nothing is written for a failed build
        assert!(!dir.path().join("out").exists(), "{}", source);
    }
}

#[test]
fn test_error_messages_name_the_operation() {
    let (_dir, result) = generate_one("class Bad { public: void f(long x); };");
    let message = result.err().unwrap().to_string();
    assert!(message.starts_with("Bad::f:"), "{}", message);
    assert!(message.contains("long"), "{}", message);

    let (_dir, result) = generate_one("class Math { public: void f(); };");
    assert!(matches!(result.err().unwrap(), GenError::DuplicateDevice(_)));
}

#[test]
fn test_missing_header() {
    let dir = tempfile::tempdir().unwrap();
    let config = GeneratorConfig::new(dir.path().join("out"), vec![dir.path().join("missing.hpp")]);
    let err = devgen::generate(&config).err().unwrap();
    assert!(matches!(err, GenError::Io { .. }));
}
