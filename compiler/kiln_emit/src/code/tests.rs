use kiln_ir::insn::{decode, Insn, Operand};
use kiln_ir::opcode::Opcode;
use kiln_ir::{well_known, Access, Code, Constant, MethodDesc, Signature, Type, UnitDef};
use pretty_assertions::assert_eq;

use crate::{CmpMode, CodeEmitter, EmitError, MathOp, SwitchCallback, SwitchStrategy, TypeEmitter};

fn sig(params: &[Type], ret: Type) -> Signature {
    Signature::new("run", MethodDesc::new(params.iter().cloned(), ret))
}

fn try_emit(
    access: Access,
    sig: &Signature,
    build: impl FnOnce(&mut CodeEmitter<'_>),
) -> Result<UnitDef, EmitError> {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Gen", None, vec![], None);
    let mut e = te.begin_method(access, sig, &[]);
    build(&mut e);
    e.end_method()?;
    te.end_type()
}

fn emit_static(params: &[Type], ret: Type, build: impl FnOnce(&mut CodeEmitter<'_>)) -> UnitDef {
    try_emit(Access::PUBLIC | Access::STATIC, &sig(params, ret), build).unwrap()
}

fn code(unit: &UnitDef) -> &Code {
    unit.methods[0].code.as_ref().unwrap()
}

fn insns(unit: &UnitDef) -> Vec<Insn> {
    decode(&code(unit).bytes).unwrap()
}

fn ops(unit: &UnitDef) -> Vec<Opcode> {
    insns(unit).into_iter().map(|i| i.op).collect()
}

#[test]
fn int_constants_use_the_smallest_form() {
    let unit = emit_static(&[], Type::Void, |e| {
        for v in [-1, 5, 6, -128, 200, 40_000] {
            e.push_int(v);
        }
        e.return_value();
    });
    assert_eq!(
        ops(&unit),
        vec![
            Opcode::IconstM1,
            Opcode::Iconst5,
            Opcode::Bipush,
            Opcode::Bipush,
            Opcode::Sipush,
            Opcode::Ldc,
            Opcode::Return,
        ]
    );
    assert_eq!(code(&unit).max_stack, 6);
    assert!(unit.pool.entries().contains(&Constant::Int(40_000)));
}

#[test]
fn negative_zero_float_goes_through_the_pool() {
    let unit = emit_static(&[], Type::Void, |e| {
        e.push_float(0.0);
        e.push_float(-0.0);
        e.push_float(2.0);
        e.return_value();
    });
    assert_eq!(
        ops(&unit),
        vec![Opcode::Fconst0, Opcode::Ldc, Opcode::Fconst2, Opcode::Return]
    );
    assert!(unit.pool.entries().contains(&Constant::float(-0.0)));
}

#[test]
fn wide_constants_count_two_slots() {
    let unit = emit_static(&[], Type::Void, |e| {
        e.push_long(0);
        e.push_long(7);
        e.push_double(1.0);
        e.return_value();
    });
    assert_eq!(
        ops(&unit),
        vec![Opcode::Lconst0, Opcode::Ldc2, Opcode::Dconst1, Opcode::Return]
    );
    assert_eq!(code(&unit).max_stack, 6);
}

#[test]
fn locals_follow_arguments_and_wide_slots() {
    let unit = emit_static(&[Type::Long, Type::Int], Type::Void, |e| {
        let d = e.make_local(Type::Double);
        let i = e.make_local(Type::Int);
        assert_eq!(d.index(), 3);
        assert_eq!(i.index(), 5);
        e.load_arg(1);
        e.store_local(&i);
        e.return_value();
    });
    assert_eq!(code(&unit).max_locals, 6);
    let first = &insns(&unit)[0];
    assert_eq!(first.op, Opcode::Iload);
    assert_eq!(first.operand, Operand::Local(2));
}

#[test]
fn instance_methods_reserve_the_receiver() {
    let unit = try_emit(Access::PUBLIC, &sig(&[Type::Int], Type::Int), |e| {
        e.load_arg(0);
        e.return_value();
    })
    .unwrap();
    assert_eq!(insns(&unit)[0].operand, Operand::Local(1));
    assert_eq!(code(&unit).max_locals, 2);
}

#[test]
fn forward_branch_targets_the_marked_offset() {
    let unit = emit_static(&[Type::Int], Type::Int, |e| {
        let zero = e.make_label();
        e.load_arg(0);
        e.if_jump(CmpMode::Eq, zero);
        e.push_int(1);
        e.return_value();
        e.mark(zero);
        e.push_int(0);
        e.return_value();
    });
    let insns = insns(&unit);
    let Operand::Branch(target) = insns[1].operand else {
        panic!("expected branch operand, got {:?}", insns[1].operand);
    };
    assert_eq!(target, insns[4].offset);
}

#[test]
fn reference_ordering_is_rejected() {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Gen", None, vec![], None);
    let mut e = te.begin_method(Access::PUBLIC | Access::STATIC, &sig(&[], Type::Void), &[]);
    let label = e.make_label();
    e.push_null();
    e.push_null();
    let err = e.if_cmp(&Type::string(), CmpMode::Lt, label).unwrap_err();
    assert!(matches!(err, EmitError::ReferenceOrdering { mode: CmpMode::Lt, .. }));
    assert!(e.if_cmp(&Type::string(), CmpMode::Eq, label).is_ok());
}

#[test]
fn float_comparisons_pick_nan_bias_per_mode() {
    let unit = emit_static(&[Type::Float, Type::Float], Type::Void, |e| {
        let out = e.make_label();
        e.load_args();
        e.if_cmp(&Type::Float, CmpMode::Gt, out).unwrap();
        e.load_args();
        e.if_cmp(&Type::Float, CmpMode::Le, out).unwrap();
        e.mark(out);
        e.return_value();
    });
    let ops = ops(&unit);
    assert!(ops.contains(&Opcode::Fcmpl));
    assert!(ops.contains(&Opcode::Fcmpg));
    assert!(ops.contains(&Opcode::Ifgt));
    assert!(ops.contains(&Opcode::Ifle));
}

#[test]
fn long_compare_reduces_then_branches() {
    let unit = emit_static(&[Type::Long, Type::Long], Type::Void, |e| {
        let out = e.make_label();
        e.load_args();
        e.if_cmp(&Type::Long, CmpMode::Ge, out).unwrap();
        e.mark(out);
        e.return_value();
    });
    assert_eq!(
        ops(&unit),
        vec![Opcode::Lload, Opcode::Lload, Opcode::Lcmp, Opcode::Ifge, Opcode::Return]
    );
    assert_eq!(code(&unit).max_stack, 4);
}

#[test]
fn unbound_label_fails_end_method() {
    let err = try_emit(Access::STATIC, &sig(&[], Type::Void), |e| {
        let never = e.make_label();
        e.goto(never);
    })
    .unwrap_err();
    assert!(matches!(err, EmitError::UnboundLabel { .. }));
}

#[test]
fn underflow_is_reported() {
    let err = try_emit(Access::STATIC, &sig(&[], Type::Void), |e| {
        e.pop();
        e.return_value();
    })
    .unwrap_err();
    assert!(matches!(err, EmitError::StackUnderflow { offset: 0, .. }));
}

#[test]
fn inconsistent_depth_at_label_is_reported() {
    let err = try_emit(Access::STATIC, &sig(&[], Type::Void), |e| {
        let join = e.make_label();
        e.push_int(1);
        e.goto(join);
        e.mark(join);
        e.return_value();
        let other = e.make_label();
        e.mark(other);
        e.goto(join);
    })
    .unwrap_err();
    assert!(matches!(
        err,
        EmitError::StackMismatch {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn this_in_static_method_is_reported() {
    let err = try_emit(Access::STATIC, &sig(&[], Type::Void), |e| {
        e.load_this();
        e.pop();
        e.return_value();
    })
    .unwrap_err();
    assert!(matches!(err, EmitError::NoReceiver { .. }));
}

#[test]
fn bad_argument_index_is_reported() {
    let err = try_emit(Access::STATIC, &sig(&[Type::Int], Type::Void), |e| {
        e.load_arg(3);
        e.return_value();
    })
    .unwrap_err();
    assert_eq!(err, EmitError::ArgumentOutOfRange { index: 3, count: 1 });
}

#[test]
fn bitwise_on_floats_is_invalid() {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Gen", None, vec![], None);
    let mut e = te.begin_method(Access::STATIC, &sig(&[], Type::Void), &[]);
    assert!(matches!(
        e.math(MathOp::And, &Type::Double),
        Err(EmitError::InvalidMath { op: "and", .. })
    ));
    e.push_long(3);
    e.push_int(1);
    e.math(MathOp::Shl, &Type::Long).unwrap();
    assert_eq!(e.stack_depth(), Some(2));
}

#[test]
fn narrowing_double_to_byte_goes_through_int() {
    let unit = emit_static(&[Type::Double], Type::Byte, |e| {
        e.load_arg(0);
        e.cast_numeric(&Type::Double, &Type::Byte);
        e.return_value();
    });
    assert_eq!(
        ops(&unit),
        vec![Opcode::Dload, Opcode::D2i, Opcode::I2b, Opcode::Ireturn]
    );
}

#[test]
fn boxing_narrow_and_wide_values() {
    let narrow = emit_static(&[Type::Int], Type::object_root(), |e| {
        e.load_arg(0);
        e.box_value(&Type::Int);
        e.return_value();
    });
    assert_eq!(
        ops(&narrow),
        vec![
            Opcode::Iload,
            Opcode::New,
            Opcode::DupX1,
            Opcode::Swap,
            Opcode::Invokespecial,
            Opcode::Areturn,
        ]
    );

    let wide = emit_static(&[Type::Double], Type::object_root(), |e| {
        e.load_arg(0);
        e.box_value(&Type::Double);
        e.return_value();
    });
    assert_eq!(
        ops(&wide),
        vec![
            Opcode::Dload,
            Opcode::New,
            Opcode::DupX2,
            Opcode::DupX2,
            Opcode::Pop,
            Opcode::Invokespecial,
            Opcode::Areturn,
        ]
    );
    assert!(wide.pool.entries().contains(&Constant::Method {
        owner: well_known::DOUBLE.to_owned(),
        name: "<init>".to_owned(),
        desc: "(D)V".to_owned(),
        interface: false,
    }));
}

#[test]
fn unbox_or_zero_branches_on_null() {
    let unit = emit_static(&[Type::object_root()], Type::Long, |e| {
        e.load_arg(0);
        e.unbox_or_zero(&Type::Long);
        e.return_value();
    });
    let ops = ops(&unit);
    assert!(ops.contains(&Opcode::Ifnonnull));
    assert!(ops.contains(&Opcode::Lconst0));
    assert!(ops.contains(&Opcode::Invokevirtual));
    assert_eq!(code(&unit).max_stack, 2);
}

#[test]
fn invoke_picks_the_call_form() {
    let unit = emit_static(&[], Type::Void, |e| {
        let iface = Type::object("test/Api");
        let sig = Signature::new("size", MethodDesc::new([], Type::Int));
        e.push_null();
        e.invoke_interface(&iface, &sig);
        e.pop();
        e.invoke_static(&Type::object("test/Util"), &sig);
        e.pop();
        e.push_null();
        e.invoke_virtual(&Type::string(), &sig);
        e.pop();
        e.return_value();
    });
    let calls: Vec<Opcode> = ops(&unit)
        .into_iter()
        .filter(|op| {
            matches!(
                op,
                Opcode::Invokeinterface | Opcode::Invokestatic | Opcode::Invokevirtual
            )
        })
        .collect();
    assert_eq!(
        calls,
        vec![Opcode::Invokeinterface, Opcode::Invokestatic, Opcode::Invokevirtual]
    );
}

#[test]
fn protected_region_records_a_handler() {
    let unit = emit_static(&[], Type::Int, |e| {
        let mut block = e.begin_block();
        assert_eq!(
            e.catch_exception(&block, None).unwrap_err(),
            EmitError::BlockNotEnded
        );
        e.push_int(1);
        e.return_value();
        e.end_block(&mut block);
        e.catch_exception(&block, Some(&Type::object(well_known::EXCEPTION)))
            .unwrap();
        e.pop();
        e.push_int(0);
        e.return_value();
    });
    let handlers = &code(&unit).handlers;
    assert_eq!(handlers.len(), 1);
    assert_eq!(handlers[0].start, 0);
    assert_eq!(handlers[0].end, 2);
    assert_eq!(handlers[0].handler, 2);
    assert_eq!(handlers[0].catch_type.as_deref(), Some(well_known::EXCEPTION));
}

#[derive(Default)]
struct Recorder {
    seen: Vec<Option<i32>>,
}

impl SwitchCallback for Recorder {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: i32,
        _end: crate::Label,
    ) -> Result<(), EmitError> {
        self.seen.push(Some(key));
        e.push_int(key.wrapping_mul(10));
        e.return_value();
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        self.seen.push(None);
        e.push_int(-1);
        e.return_value();
        Ok(())
    }
}

fn switch_unit(keys: &[i32], strategy: Option<SwitchStrategy>) -> (UnitDef, Vec<Option<i32>>) {
    let mut rec = Recorder::default();
    let unit = emit_static(&[Type::Int], Type::Int, |e| {
        e.load_arg(0);
        match strategy {
            Some(s) => e.process_switch_with(keys, s, &mut rec).unwrap(),
            None => e.process_switch(keys, &mut rec).unwrap(),
        }
    });
    (unit, rec.seen)
}

#[test]
fn density_selects_table_or_lookup() {
    assert_eq!(SwitchStrategy::choose(&[1, 2, 3]), SwitchStrategy::Table);
    assert_eq!(SwitchStrategy::choose(&[1, 3]), SwitchStrategy::Table);
    assert_eq!(SwitchStrategy::choose(&[1, 4]), SwitchStrategy::Lookup);
    assert_eq!(SwitchStrategy::choose(&[1, 100, 1000]), SwitchStrategy::Lookup);
    assert_eq!(
        SwitchStrategy::choose(&[i32::MIN, i32::MAX]),
        SwitchStrategy::Lookup
    );

    let (dense, _) = switch_unit(&[1, 2, 3], None);
    assert!(ops(&dense).contains(&Opcode::Tableswitch));
    let (sparse, _) = switch_unit(&[1, 100, 1000], None);
    assert!(ops(&sparse).contains(&Opcode::Lookupswitch));
}

#[test]
fn callback_runs_per_key_in_order_then_default() {
    let (_, seen) = switch_unit(&[-5, 0, 7], Some(SwitchStrategy::Binary));
    assert_eq!(seen, vec![Some(-5), Some(0), Some(7), None]);
}

#[test]
fn table_holes_point_at_default() {
    let (unit, _) = switch_unit(&[10, 12], Some(SwitchStrategy::Table));
    let insns = insns(&unit);
    let Operand::Table {
        default,
        low,
        targets,
    } = &insns[1].operand
    else {
        panic!("expected table switch");
    };
    assert_eq!(*low, 10);
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[1], *default);
    assert_ne!(targets[0], *default);
}

#[test]
fn unsorted_keys_are_rejected() {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Gen", None, vec![], None);
    let mut e = te.begin_method(Access::STATIC, &sig(&[Type::Int], Type::Int), &[]);
    e.load_arg(0);
    let err = e.process_switch(&[3, 1], &mut Recorder::default()).unwrap_err();
    assert_eq!(err, EmitError::UnsortedSwitchKeys { index: 1 });
    let err = e.process_switch(&[1, 1], &mut Recorder::default()).unwrap_err();
    assert_eq!(err, EmitError::UnsortedSwitchKeys { index: 1 });
}

#[test]
fn empty_switch_pops_and_runs_default() {
    let (unit, seen) = switch_unit(&[], None);
    assert_eq!(seen, vec![None]);
    assert_eq!(
        ops(&unit),
        vec![Opcode::Iload, Opcode::Pop, Opcode::IconstM1, Opcode::Ireturn]
    );
}
