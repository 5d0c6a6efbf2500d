//! Artifact rendering.
//!
//! A renderer turns descriptors into files. Rendering never touches the
//! filesystem; `generate` writes the artifacts once every device rendered.

use std::fmt::Write as _;
use std::path::PathBuf;

use super::codegen::{args_struct, device_class, execute_function, execute_switch, parse_function};
use super::descriptor::DeviceDescriptor;
use super::error::{GenError, GenResult};
use super::table::DeviceTable;

/// One generated file, path relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, contents: String) -> Self {
        Self {
            path: path.into(),
            contents,
        }
    }
}

pub trait Render {
    /// Files of one device. `header` is the declaring header, as included.
    fn render_device(&self, device: &DeviceDescriptor, header: &str) -> Vec<Artifact>;

    /// Files shared by all devices.
    fn render_table(&self, table: &DeviceTable) -> GenResult<Vec<Artifact>>;
}

/// Emits C++ marshalling sources and the JSON catalogue.
#[derive(Debug, Default, Clone, Copy)]
pub struct CppRenderer;

const BANNER: &str = "/// Generated by devgen. Do not edit.\n";

fn include_guard(name: &str) -> String {
    format!("__DEVLINK_{}__", name.to_uppercase().replace(['.', '-'], "_"))
}

fn escape_cpp(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

pub fn device_file_stem(device: &DeviceDescriptor) -> String {
    format!("{}_device", device.tag.to_lowercase())
}

impl CppRenderer {
    fn device_header(&self, device: &DeviceDescriptor, header: &str) -> String {
        let class = device_class(device);
        let guard = include_guard(&format!("{}.hpp", device_file_stem(device)));
        let mut out = String::from(BANNER);

        let _ = writeln!(out);
        let _ = writeln!(out, "#ifndef {}", guard);
        let _ = writeln!(out, "#define {}", guard);
        let _ = writeln!(out);
        let _ = writeln!(out, "#include <mutex>");
        let _ = writeln!(out, "#include <devlink/device.hpp>");
        let _ = writeln!(out, "#include \"{}\"", header);
        let _ = writeln!(out);
        let _ = writeln!(out, "namespace devlink {{");
        let _ = writeln!(out);
        let _ = writeln!(out, "class {} : public DeviceBase {{", class);
        let _ = writeln!(out, "  public:");
        let _ = writeln!(out, "    enum Operation {{");
        for op in &device.operations {
            let _ = writeln!(out, "        {},", op.tag);
        }
        let _ = writeln!(out, "        {}_op_num", device.tag.to_lowercase());
        let _ = writeln!(out, "    }};");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "    {}(Server& server, {}& dev)\n    : DeviceBase(server, {}, \"{}\")\n    , THIS(&dev)\n    {{}}",
            class, device.name, device.id, device.tag
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "    int execute(Command& cmd);");
        let _ = writeln!(out, "    bool is_failed();");

        for op in &device.operations {
            let _ = writeln!(out);
            out.push_str(&args_struct(op));
            let _ = writeln!(
                out,
                "    int parse_arg_{}(Command& cmd, Args_{}& args);",
                op.name, op.name
            );
            let _ = writeln!(out, "    int execute_{}(Command& cmd);", op.name);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "  private:");
        let _ = writeln!(out, "    {}* THIS;", device.name);
        let _ = writeln!(out, "    std::mutex mutex;");
        let _ = writeln!(out, "}};");
        let _ = writeln!(out);
        let _ = writeln!(out, "}} // namespace devlink");
        let _ = writeln!(out);
        let _ = writeln!(out, "#endif // {}", guard);
        out
    }

    fn device_source(&self, device: &DeviceDescriptor) -> String {
        let mut out = String::from(BANNER);
        let _ = writeln!(out);
        let _ = writeln!(out, "#include \"{}.hpp\"", device_file_stem(device));
        let _ = writeln!(out);
        let _ = writeln!(out, "namespace devlink {{");

        for op in &device.operations {
            let _ = writeln!(out);
            let _ = writeln!(out, "/////////////////////////////////////");
            let _ = writeln!(out, "// {}", op.tag);
            let _ = writeln!(out);
            out.push_str(&parse_function(device, op));
            let _ = writeln!(out);
            out.push_str(&execute_function(device, op));
        }

        let _ = writeln!(out);
        out.push_str(&execute_switch(device));
        let _ = writeln!(out);
        let _ = writeln!(out, "}} // namespace devlink");
        out
    }

    fn table_header(&self, table: &DeviceTable) -> String {
        let guard = include_guard("devices_table.hpp");
        let width = table.max_op_num();
        let mut out = String::from(BANNER);

        let _ = writeln!(out);
        let _ = writeln!(out, "#ifndef {}", guard);
        let _ = writeln!(out, "#define {}", guard);
        let _ = writeln!(out);
        let _ = writeln!(out, "#include <array>");
        let _ = writeln!(out, "#include <cstdint>");
        let _ = writeln!(out);
        let _ = writeln!(out, "namespace devlink {{");
        let _ = writeln!(out);
        let _ = writeln!(out, "constexpr std::size_t device_num = {};", table.devices().len());
        let _ = writeln!(out, "constexpr std::size_t max_op_num = {};", width);
        let _ = writeln!(out);

        for dev in table.devices() {
            let _ = writeln!(out, "constexpr uint16_t {}_ID = {};", dev.tag, dev.id);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "constexpr std::array<const char*, device_num> devices_names = {{");
        for dev in table.devices() {
            let _ = writeln!(out, "    \"{}\",", dev.tag);
        }
        let _ = writeln!(out, "}};");
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "constexpr std::array<std::array<const char*, max_op_num>, device_num> operations_names = {{{{"
        );
        for (_, _, ops) in table.name_matrix() {
            let names: Vec<String> = ops.iter().map(|op| format!("\"{}\"", op)).collect();
            let _ = writeln!(out, "    {{{{{}}}}},", names.join(", "));
        }
        let _ = writeln!(out, "}}}};");
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "constexpr const char* discovery_table = \"{}\";",
            escape_cpp(&table.discovery().render())
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "}} // namespace devlink");
        let _ = writeln!(out);
        let _ = writeln!(out, "#endif // {}", guard);
        out
    }
}

impl Render for CppRenderer {
    fn render_device(&self, device: &DeviceDescriptor, header: &str) -> Vec<Artifact> {
        let stem = device_file_stem(device);
        vec![
            Artifact::new(format!("{}.hpp", stem), self.device_header(device, header)),
            Artifact::new(format!("{}.cpp", stem), self.device_source(device)),
        ]
    }

    fn render_table(&self, table: &DeviceTable) -> GenResult<Vec<Artifact>> {
        Ok(vec![
            Artifact::new("devices_table.hpp", self.table_header(table)),
            Artifact::new(
                "devices.json",
                table
                    .catalogue()
                    .to_json()
                    .map_err(|e| GenError::Catalogue(e.to_string()))?,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devgen::annotations::DEFAULT_NAMESPACE;
    use crate::devgen::parse_source;

    fn table() -> DeviceTable {
        let devices = parse_source(
            "class Math { public: uint32_t add(uint32_t a, uint32_t b); void reset(); };",
            "math.hpp",
            DEFAULT_NAMESPACE,
        )
        .unwrap();
        DeviceTable::build(devices).unwrap()
    }

    #[test]
    fn test_device_files() {
        let table = table();
        let math = &table.user_devices()[0];
        let artifacts = CppRenderer.render_device(math, "math.hpp");
        let paths: Vec<&str> = artifacts.iter().map(|a| a.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["math_device.hpp", "math_device.cpp"]);

        let header = &artifacts[0].contents;
        assert!(header.starts_with(BANNER));
        assert!(header.contains("#include \"math.hpp\""));
        assert!(header.contains("        ADD,\n        RESET,\n        math_op_num\n"));
        assert!(header.contains("DeviceBase(server, 2, \"MATH\")"));
        assert!(artifacts[1].contents.contains("int MathDevice::execute_add(Command& cmd) {"));
    }

    #[test]
    fn test_table_files() {
        let artifacts = CppRenderer.render_table(&table()).unwrap();
        let header = &artifacts[0].contents;
        assert!(header.contains("constexpr std::size_t device_num = 2;"));
        assert!(header.contains("constexpr uint16_t MATH_ID = 2;"));
        assert!(header.contains("{{\"ADD\", \"RESET\", \"\", \"\", \"\", \"\", \"\"}},"));
        assert!(header.contains("discovery_table = \"7\\n#1:CONTROL:"));

        assert_eq!(artifacts[1].path, PathBuf::from("devices.json"));
        assert!(artifacts[1].contents.contains("\"class\": \"Math\""));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_cpp("a\"b\\c\n"), "a\\\"b\\\\c\\n");
    }
}
