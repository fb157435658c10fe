//! Human-readable rendering of a unit, written beside dumped units by the
//! debug sink.

use std::fmt::Write;

use crate::insn::{decode, Operand};
use crate::{Code, ConstantPool, UnitDef};

/// Render `unit` as text. Bodies that fail to decode are rendered with the
/// decode error in place of their instructions.
pub fn disassemble(unit: &UnitDef) -> String {
    let mut out = String::new();
    // `fmt::Write` for `String` is infallible; results are ignored below.
    let _ = write!(out, "{} unit {}", unit.access.keywords(), unit.name);
    if let Some(sup) = &unit.super_name {
        let _ = write!(out, " extends {sup}");
    }
    if !unit.interfaces.is_empty() {
        let _ = write!(out, " implements {}", unit.interfaces.join(", "));
    }
    out.push('\n');
    if let Some(source) = &unit.source {
        let _ = writeln!(out, "  // source: {source}");
    }

    for field in &unit.fields {
        let _ = write!(out, "  {} {} {}", field.access.keywords(), field.ty, field.name);
        if let Some(constant) = field.constant.and_then(|idx| unit.pool.get(idx)) {
            let _ = write!(out, " = {constant}");
        }
        out.push('\n');
    }

    for method in &unit.methods {
        let _ = writeln!(
            out,
            "\n  {} {}{}",
            method.access.keywords(),
            method.name,
            method.desc
        );
        if !method.exceptions.is_empty() {
            let _ = writeln!(out, "    throws {}", method.exceptions.join(", "));
        }
        if let Some(code) = &method.code {
            render_code(&mut out, code, &unit.pool);
        }
    }
    out
}

fn render_code(out: &mut String, code: &Code, pool: &ConstantPool) {
    let _ = writeln!(
        out,
        "    // max_stack={} max_locals={}",
        code.max_stack, code.max_locals
    );
    let insns = match decode(&code.bytes) {
        Ok(insns) => insns,
        Err(err) => {
            let _ = writeln!(out, "    <undecodable: {err}>");
            return;
        }
    };
    for insn in insns {
        let _ = write!(out, "    {:>5}: {}", insn.offset, insn.op.mnemonic());
        match &insn.operand {
            Operand::None => {}
            Operand::Int(v) => {
                let _ = write!(out, " {v}");
            }
            Operand::Local(slot) => {
                let _ = write!(out, " {slot}");
            }
            Operand::Iinc { local, delta } => {
                let _ = write!(out, " {local} {delta:+}");
            }
            Operand::Pool(idx) => match pool.get(*idx) {
                Some(constant) => {
                    let _ = write!(out, " #{idx} // {constant}");
                }
                None => {
                    let _ = write!(out, " #{idx} // <invalid>");
                }
            },
            Operand::Branch(target) => {
                let _ = write!(out, " {target}");
            }
            Operand::ArrayType(ty) => {
                let _ = write!(out, " {ty}");
            }
            Operand::Table {
                default,
                low,
                targets,
            } => {
                for (i, target) in targets.iter().enumerate() {
                    let key = i64::from(*low) + i as i64;
                    let _ = write!(out, "\n             {key}: {target}");
                }
                let _ = write!(out, "\n             default: {default}");
            }
            Operand::Lookup { default, pairs } => {
                for (key, target) in pairs {
                    let _ = write!(out, "\n             {key}: {target}");
                }
                let _ = write!(out, "\n             default: {default}");
            }
        }
        out.push('\n');
    }
    for handler in &code.handlers {
        let _ = writeln!(
            out,
            "    catch {} [{}, {}) -> {}",
            handler.catch_type.as_deref().unwrap_or("any"),
            handler.start,
            handler.end,
            handler.handler
        );
    }
}
