//! Marshalling code generator.
//!
//! Emits, per operation, the C++ argument structure, the parse function
//! that rebuilds the arguments from the pack layout and the execute
//! function that calls the device method and sends its result.

use std::fmt::Write as _;

use super::annotations::length_expr_to_cpp;
use super::descriptor::{ArgKind, DeviceDescriptor, IoType, OperationDescriptor};
use super::packs::{layout, OperationLayout, PackFamily, Region};
use super::types::WireType;

/// C++ class wrapping a device.
pub fn device_class(device: &DeviceDescriptor) -> String {
    format!("{}Device", device.name)
}

pub fn args_struct_name(op: &OperationDescriptor) -> String {
    format!("Args_{}", op.name)
}

/// `struct Args_<op> { ... };`
pub fn args_struct(op: &OperationDescriptor) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "    struct {} {{", args_struct_name(op));
    for arg in &op.arguments {
        let _ = writeln!(out, "        {} {};", arg.ty, arg.name);
    }
    let _ = writeln!(out, "    }};");
    out
}

/// `int parse_arg_<op>(Command& cmd, Args_<op>& args) { ... }`
pub fn parse_function(device: &DeviceDescriptor, op: &OperationDescriptor) -> String {
    let plan = layout(&op.arguments);
    let context = format!("[{} - {}]", device.name, op.name);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "int {}::parse_arg_{}(Command& cmd, {}& args) {{",
        device_class(device),
        op.name,
        args_struct_name(op)
    );

    if !plan.has_vector {
        let _ = writeln!(
            out,
            "    static_assert({} <= Command::BUFFER_SIZE, \"{} Payload exceeds the command buffer\");",
            plan.payload_size, context
        );
    }
    let _ = writeln!(out, "    if (cmd.payload_size != {}) {{", plan.payload_size);
    let _ = writeln!(
        out,
        "        log_error(\"{} Invalid payload size. Expected {} bytes. Received %u bytes.\\n\", cmd.payload_size);",
        context, plan.payload_size
    );
    let _ = writeln!(out, "        return -1;");
    let _ = writeln!(out, "    }}");

    emit_packs(&mut out, op, &plan, &context);

    let _ = writeln!(out, "    return 0;");
    let _ = writeln!(out, "}}");
    out
}

fn emit_packs(out: &mut String, op: &OperationDescriptor, plan: &OperationLayout, context: &str) {
    for (idx, pack) in plan.packs.iter().enumerate() {
        let _ = writeln!(out);
        let (buffer, offset) = match pack.region {
            Region::Envelope { offset } => ("cmd.buffer".to_string(), offset),
            Region::Reload => {
                let name = format!("buff{}", idx);
                let _ = writeln!(out, "    Buffer<{}> {};", pack.size, name);
                let _ = writeln!(out, "    if (cmd.session->load_buffer({}) < 0) {{", name);
                let _ = writeln!(
                    out,
                    "        log_error(\"{} Failed to load buffer of {} bytes\\n\");",
                    context, pack.size
                );
                let _ = writeln!(out, "        return -1;");
                let _ = writeln!(out, "    }}");
                (name, 0)
            }
        };

        match pack.family {
            PackFamily::Scalar => {
                let types: Vec<&str> = pack
                    .members
                    .iter()
                    .map(|&i| op.arguments[i].kind.element().cpp_name())
                    .collect();
                let _ = writeln!(
                    out,
                    "    auto pack{} = cmd.session->deserialize<{}>({}, {});",
                    idx,
                    types.join(", "),
                    buffer,
                    offset
                );
                for (pos, &i) in pack.members.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "    args.{} = std::get<{}>(pack{});",
                        op.arguments[i].name, pos, idx
                    );
                }
            }
            PackFamily::Array => {
                let arg = &op.arguments[pack.members[0]];
                if let ArgKind::FixedArray { elem, len } = arg.kind {
                    let _ = writeln!(
                        out,
                        "    if (!cmd.session->extract_array<{}, {}>({}, {}, args.{})) {{",
                        elem.cpp_name(),
                        len,
                        buffer,
                        offset,
                        arg.name
                    );
                    let _ = writeln!(out, "        log_error(\"{} Failed to extract array\\n\");", context);
                    let _ = writeln!(out, "        return -1;");
                    let _ = writeln!(out, "    }}");
                }
            }
            PackFamily::Vector => {
                let arg = &op.arguments[pack.members[0]];
                let _ = writeln!(
                    out,
                    "    auto length{} = std::get<0>(cmd.session->deserialize<uint64_t>({}, {}));",
                    idx, buffer, offset
                );
                let _ = writeln!(
                    out,
                    "    if (cmd.session->recv_vector(args.{}, length{}) < 0) {{",
                    arg.name, idx
                );
                let _ = writeln!(out, "        log_error(\"{} Failed to receive vector\\n\");", context);
                let _ = writeln!(out, "        return -1;");
                let _ = writeln!(out, "    }}");
            }
        }
    }
}

/// `int execute_<op>(Command& cmd) { ... }`
pub fn execute_function(device: &DeviceDescriptor, op: &OperationDescriptor) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "int {}::execute_{}(Command& cmd) {{", device_class(device), op.name);
    let _ = writeln!(out, "    {} args;", args_struct_name(op));

    if let Some(wa) = &op.write_array {
        let _ = writeln!(
            out,
            "    {}{}* args_{} = nullptr;",
            if wa.is_const { "const " } else { "" },
            wa.element.cpp_name(),
            wa.pointer
        );
    }

    let _ = writeln!(out, "    if (parse_arg_{}(cmd, args) < 0) {{", op.name);
    let _ = writeln!(out, "        return -1;");
    let _ = writeln!(out, "    }}");

    // The buffer follows the packs on the stream
    if let Some(wa) = &op.write_array {
        let _ = writeln!(
            out,
            "    if (cmd.session->recv_array(args_{}, args.{}) < 0) {{",
            wa.pointer, wa.length
        );
        let _ = writeln!(
            out,
            "        log_error(\"[{} - {}] Failed to receive array\\n\");",
            device.name, op.name
        );
        let _ = writeln!(out, "        return -1;");
        let _ = writeln!(out, "    }}");
    }

    let call_args: Vec<String> = op
        .call_order()
        .into_iter()
        .map(|name| match &op.write_array {
            Some(wa) if wa.pointer == name => format!("args_{}", name),
            _ => format!("args.{}", name),
        })
        .collect();
    let call = format!("THIS->{}({})", op.name, call_args.join(", "));

    match op.io_type {
        IoType::Write => {
            let _ = writeln!(out, "    {};", call);
            let _ = writeln!(out, "    return 0;");
        }
        IoType::Read => {
            let _ = writeln!(out, "    return cmd.session->send({});", call);
        }
        IoType::ReadCstr => {
            let _ = writeln!(out, "    return cmd.session->send_cstr({});", call);
        }
        IoType::ReadArray => match (&op.returns, &op.read_array_length) {
            (WireType::Pointer(_), Some(len)) => {
                let _ = writeln!(out, "    auto ptr = {};", call);
                let _ = writeln!(
                    out,
                    "    return cmd.session->send_array(ptr, {});",
                    length_expr_to_cpp(len)
                );
            }
            _ => {
                let _ = writeln!(out, "    return cmd.session->send_array({});", call);
            }
        },
    }

    let _ = writeln!(out, "}}");
    out
}

/// Locked switch over the operation ids.
pub fn execute_switch(device: &DeviceDescriptor) -> String {
    let class = device_class(device);
    let mut out = String::new();
    let _ = writeln!(out, "int {}::execute(Command& cmd) {{", class);
    let _ = writeln!(out, "    std::lock_guard<std::mutex> lock(mutex);");
    let _ = writeln!(out);
    let _ = writeln!(out, "    switch (cmd.operation) {{");
    for op in &device.operations {
        let _ = writeln!(out, "      case {}:", op.tag);
        let _ = writeln!(out, "        return execute_{}(cmd);", op.name);
    }
    let _ = writeln!(out, "      case {}_op_num:", device.tag.to_lowercase());
    let _ = writeln!(out, "      default:");
    let _ = writeln!(
        out,
        "        log_error(\"{}: Unknown operation %u\\n\", cmd.operation);",
        device.tag
    );
    let _ = writeln!(out, "        return -1;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "bool {}::is_failed() {{", class);
    match &device.is_failed {
        Some(method) => {
            let _ = writeln!(out, "    std::lock_guard<std::mutex> lock(mutex);");
            let _ = writeln!(out, "    return THIS->{}();", method);
        }
        None => {
            let _ = writeln!(out, "    return false;");
        }
    }
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devgen::annotations::DEFAULT_NAMESPACE;
    use crate::devgen::parse_source;

    fn device() -> DeviceDescriptor {
        parse_source(
            "class Math {
  public:
    uint32_t add(uint32_t a, uint32_t b);
    bool set_buffer(const std::vector<uint32_t>& buf);
    float mix(uint32_t seed, const std::vector<float>& v, uint16_t scale, std::array<uint8_t, 4> tail);
    const char* name();
    void reset();
    #pragma devlink write_array arg{data} arg{len}
    void load(uint32_t offset, const uint32_t* data, uint32_t len);
    #pragma devlink read_array 2*arg{n}
    const float* samples(uint32_t n);
    #pragma devlink is_failed
    bool is_failed();
};",
            "math.hpp",
            DEFAULT_NAMESPACE,
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_scalar_parse() {
        let dev = device();
        let code = parse_function(&dev, dev.operation_by_name("add").unwrap());
        assert!(code.contains("static_assert(8 <= Command::BUFFER_SIZE"));
        assert!(code.contains("if (cmd.payload_size != 8)"));
        assert!(code.contains("[Math - add] Invalid payload size. Expected 8 bytes."));
        assert!(code.contains("auto pack0 = cmd.session->deserialize<uint32_t, uint32_t>(cmd.buffer, 0);"));
        assert!(code.contains("args.b = std::get<1>(pack0);"));
    }

    #[test]
    fn test_vector_parse_reloads() {
        let dev = device();
        let code = parse_function(&dev, dev.operation_by_name("mix").unwrap());
        assert!(!code.contains("static_assert"));
        assert!(code.contains("if (cmd.payload_size != 12)"));
        assert!(code.contains("deserialize<uint64_t>(cmd.buffer, 4)"));
        assert!(code.contains("Buffer<2> buff2;"));
        assert!(code.contains("deserialize<uint16_t>(buff2, 0)"));
        assert!(code.contains("Buffer<4> buff3;"));
        assert!(code.contains("extract_array<uint8_t, 4>(buff3, 0, args.tail)"));
    }

    #[test]
    fn test_execute_by_io_type() {
        let dev = device();
        let exec = |name: &str| execute_function(&dev, dev.operation_by_name(name).unwrap());
        assert!(exec("add").contains("return cmd.session->send(THIS->add(args.a, args.b));"));
        assert!(exec("name").contains("send_cstr(THIS->name())"));
        assert!(exec("reset").contains("    THIS->reset();\n    return 0;"));

        let load = exec("load");
        assert!(load.contains("const uint32_t* args_data = nullptr;"));
        assert!(load.contains("THIS->load(args.offset, args_data, args.len);"));

        assert!(exec("samples").contains("send_array(ptr, 2*args.n)"));
    }

    #[test]
    fn test_switch() {
        let dev = device();
        let code = execute_switch(&dev);
        assert!(code.contains("case ADD:\n        return execute_add(cmd);"));
        assert!(code.contains("case math_op_num:"));
        assert!(code.contains("return THIS->is_failed();"));
    }

    #[test]
    fn test_deterministic() {
        let dev = device();
        for op in &dev.operations {
            assert_eq!(parse_function(&dev, op), parse_function(&dev, op));
        }
    }
}
