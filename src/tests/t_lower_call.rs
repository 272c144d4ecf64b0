use super::*;

use crate::ast::{AccessorKind, DeclRef, ScalarKind, StmtKind, Val};
use crate::ir::{BlockId, InstId, IrGlobalKind, ValueId};
use crate::test_helpers as h;

#[test]
fn test_by_ref_swizzle_args_use_temps_with_writeback() {
    let mut b = h::ModuleBuilder::new();
    let vec2 = Type::vector(ScalarKind::Float, 2);
    let vec4 = Type::vector(ScalarKind::Float, 4);
    let pa = b.param("a", vec2.clone(), ParamDir::Out);
    let pb = b.param("b", vec2.clone(), ParamDir::InOut);
    let adjust = b.func("adjust", vec![pa, pb], Type::Void, None);

    let (v, v_stmt) = b.local("v", vec4.clone(), None);
    let (w, w_stmt) = b.local("w", vec4.clone(), None);
    let v_ref = b.var(v, vec4.clone());
    let arg_a = b.swizzle(v_ref, &[0, 1], vec2.clone());
    let w_ref = b.var(w, vec4);
    let arg_b = b.swizzle(w_ref, &[1, 0], vec2);
    let call = b.call_fn(adjust, vec![arg_a, arg_b], Type::Void);
    let call_stmt = b.expr_stmt(call);
    let body = b.block(vec![v_stmt, w_stmt, call_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let body = h::func_body(&unit.ir, "main");

    // Swizzles are not addressable, so each by-ref argument gets a
    // temporary; `inout` also copies the current value in. After the call
    // both temporaries are written back through masked stores.
    let insts = h::insts_in_order(body);
    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::Var, Op::Var, Op::Var, Op::Load, Op::Swizzle { .. }, Op::Store, Op::Call, Op::Load, Op::SwizzledStore { indices: back_a }, Op::Load, Op::SwizzledStore { indices: back_b }] =>
        {
            assert_eq!(back_a, &vec![0, 1]);
            assert_eq!(back_b, &vec![1, 0]);
        }
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    let writebacks: Vec<InstId> = insts
        .iter()
        .copied()
        .filter(|i| matches!(body.inst(*i).op, Op::SwizzledStore { .. }))
        .collect();
    assert_eq!(body.inst(writebacks[0]).operands[0], Operand::Inst(insts[0]));
    assert_eq!(body.inst(writebacks[1]).operands[0], Operand::Inst(insts[1]));
    let call = h::find_inst(body, |i| i.op == Op::Call).expect("call");
    assert_eq!(body.inst(call).operands[1], Operand::Inst(insts[2]));
    assert_eq!(body.inst(call).operands[2], Operand::Inst(insts[3]));
}

#[test]
fn test_default_argument_sees_earlier_parameters() {
    let mut b = h::ModuleBuilder::new();
    let pa = b.param("a", Type::float(), ParamDir::In);
    let default = b.var(pa, Type::float());
    let pb = b.param_with_default("b", Type::float(), ParamDir::In, default);
    let pad = b.func("pad", vec![pa, pb], Type::Void, None);

    let arg = b.float(3.0);
    let call = b.call_fn(pad, vec![arg], Type::Void);
    let call_stmt = b.expr_stmt(call);
    let body = b.block(vec![call_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let pad_val = h::global(&unit.ir, "pad");
    let body = h::func_body(&unit.ir, "main");

    let call = h::find_inst(body, |i| i.op == Op::Call).expect("call");
    assert_eq!(
        body.inst(call).operands,
        vec![
            Operand::Global(pad_val),
            Operand::Const(Const::float(3.0)),
            Operand::Const(Const::float(3.0)),
        ]
    );
}

#[test]
fn test_raised_error_routes_to_catch_handler() {
    let mut b = h::ModuleBuilder::new();
    let may_fail = b.throwing_func("may_fail", vec![], Type::Void, Type::int(), None);

    let call = b.call_fn(may_fail, vec![], Type::Void);
    let call_stmt = b.expr_stmt(call);
    let tc_body = b.block(vec![call_stmt]);
    let handler = b.block(vec![]);
    let tc = b.stmt(StmtKind::TryCatch {
        body: Box::new(tc_body),
        err_param: None,
        handler: Box::new(handler),
    });
    let body = b.block(vec![tc]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let may_fail_val = h::global(&unit.ir, "may_fail");
    let body = h::func_body(&unit.ir, "main");

    assert_eq!(body.blocks.len(), 5);
    let call = h::find_inst(body, |i| i.op == Op::Call).expect("call");
    let call = body.inst(call);
    assert_eq!(call.operands.len(), 3);
    assert_eq!(call.operands[0], Operand::Global(may_fail_val));
    // The throw flag is cleared before the call, then tested after it.
    let threw = call.operands[2];
    assert!(h::find_inst(body, |i| {
        i.op == Op::Store && i.operands == vec![threw, Operand::Const(Const::Bool(false))]
    })
    .is_some());
    match &body.block(body.entry).term {
        Terminator::Branch { then_bb, else_bb, .. } => {
            assert_eq!(*then_bb, BlockId(3));
            assert_eq!(*else_bb, BlockId(4));
        }
        other => panic!("expected a branch on the throw flag, found {}", other),
    }
    // Thrown path drains into the handler, the clean path skips it.
    assert_eq!(body.blocks[3].term, Terminator::Jump(BlockId(1)));
    assert_eq!(body.blocks[4].term, Terminator::Jump(BlockId(2)));
    assert_eq!(body.blocks[1].term, Terminator::Jump(BlockId(2)));
    assert_eq!(body.blocks[2].term, Terminator::Return(None));
}

#[test]
fn test_throwing_function_carries_error_out_params() {
    let mut b = h::ModuleBuilder::new();
    let val = b.float(1.5);
    let thr = b.stmt(StmtKind::Throw(val));
    let fbody = b.block(vec![thr]);
    let fail = b.throwing_func("fail", vec![], Type::float(), Type::float(), Some(fbody));
    b.export(fail);

    let mut unit = b.lower();
    println!("{}", unit.ir);
    let f32_ty = unit.ir.types.intern(IrType::Float { bits: 32 });
    let bool_ty = unit.ir.types.intern(IrType::Bool);
    let err_ptr = unit.ir.types.intern(IrType::Ptr { pointee: f32_ty });
    let threw_ptr = unit.ir.types.intern(IrType::Ptr { pointee: bool_ty });

    let fail_val = h::global(&unit.ir, "fail");
    let func = unit.ir.func(fail_val);
    assert_eq!(func.param_tys, vec![err_ptr, threw_ptr]);

    let body = h::func_body(&unit.ir, "fail");
    assert_eq!(body.blocks.len(), 1);
    let insts = h::insts_in_order(body);
    // throw = write the error, raise the flag, return garbage.
    assert!(h::find_inst(body, |i| {
        i.op == Op::Store
            && i.operands == vec![Operand::Inst(insts[0]), Operand::Const(Const::float(1.5))]
    })
    .is_some());
    assert!(h::find_inst(body, |i| {
        i.op == Op::Store
            && i.operands == vec![Operand::Inst(insts[1]), Operand::Const(Const::Bool(true))]
    })
    .is_some());
    let undef = h::find_inst(body, |i| i.op == Op::Undef).expect("undef result");
    assert_eq!(
        body.block(body.entry).term,
        Terminator::Return(Some(Operand::Inst(undef)))
    );
}

#[test]
fn test_non_copyable_result_returns_through_pointer() {
    let mut b = h::ModuleBuilder::new();
    let big = b.struct_decl("Big", true);
    let big_ty = Type::Struct(DeclRef::direct(big));
    let make_big = b.func("make_big", vec![], big_ty.clone(), None);

    let (bigv, big_stmt) = b.local("bigv", big_ty.clone(), None);
    let left = b.var(bigv, big_ty.clone());
    let right = b.call_fn(make_big, vec![], big_ty);
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![big_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let make_big_val = h::global(&unit.ir, "make_big");
    let body = h::func_body(&unit.ir, "main");

    // The callee fills a caller-provided slot instead of returning by value.
    let func = unit.ir.func(make_big_val);
    assert_eq!(func.param_tys.len(), 1);
    assert!(matches!(
        unit.ir.types.kind(func.param_tys[0]),
        IrType::Ptr { .. }
    ));

    // Assigning the result to an addressable left side hands that address to
    // the callee; no temporary, no copy after the call.
    let insts = h::insts_in_order(body);
    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::Call] => {}
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    assert_eq!(
        body.inst(insts[1]).operands,
        vec![Operand::Global(make_big_val), Operand::Inst(insts[0])]
    );
}

#[test]
fn test_non_copyable_initializer_fills_local_slot() {
    let mut b = h::ModuleBuilder::new();
    let big = b.struct_decl("Big", true);
    let big_ty = Type::Struct(DeclRef::direct(big));
    let make_big = b.func("make_big", vec![], big_ty.clone(), None);

    let init = b.call_fn(make_big, vec![], big_ty.clone());
    let (bigv, big_stmt) = b.local("bigv", big_ty.clone(), Some(init));
    let use_expr = b.var(bigv, big_ty);
    let use_stmt = b.expr_stmt(use_expr);
    let body = b.block(vec![big_stmt, use_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let make_big_val = h::global(&unit.ir, "make_big");
    let body = h::func_body(&unit.ir, "main");

    // The local's slot doubles as the call's destination parameter.
    let insts = h::insts_in_order(body);
    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::Call] => {}
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    assert_eq!(
        body.inst(insts[1]).operands,
        vec![Operand::Global(make_big_val), Operand::Inst(insts[0])]
    );
}

#[test]
fn test_default_argument_sees_generic_substitution() {
    let mut b = h::ModuleBuilder::new();
    let n = b.value_param("N", Type::int());
    let pa = b.param("a", Type::float(), ParamDir::In);
    let default = b.var(n, Type::int());
    let pb = b.param_with_default("b", Type::int(), ParamDir::In, default);
    let pad = b.func("pad", vec![pa, pb], Type::Void, None);
    let g = b.generic("pad.generic", vec![n], pad);

    let callee = b.expr(
        Type::Void,
        ExprKind::DeclRef(DeclRef::generic_app(pad, g, vec![Val::Int(4)])),
    );
    let arg = b.float(3.0);
    let call = b.call(callee, vec![arg], Type::Void);
    let call_stmt = b.expr_stmt(call);
    let body = b.block(vec![call_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let body = h::func_body(&unit.ir, "main");

    let four = (0..unit.ir.values.len())
        .map(|i| ValueId(i as u32))
        .find(|v| matches!(unit.ir.value(*v).kind, IrGlobalKind::ConstInt { value: 4 }))
        .expect("lowered argument constant");
    let call = h::find_inst(body, |i| i.op == Op::Call).expect("call");
    let operands = &body.inst(call).operands;
    assert_eq!(operands.len(), 3);
    // The callee is the specialization, and the omitted argument's default
    // reads `N` as bound at this call site.
    let spec = match operands[0] {
        Operand::Global(v) => v,
        ref other => panic!("expected a specialized callee, got {:?}", other),
    };
    assert!(matches!(
        unit.ir.value(spec).kind,
        IrGlobalKind::Specialize { .. }
    ));
    assert_eq!(operands[1], Operand::Const(Const::float(3.0)));
    assert_eq!(operands[2], Operand::Global(four));
}

#[test]
fn test_mutating_method_on_property_writes_back() {
    let mut b = h::ModuleBuilder::new();
    let counter = b.struct_decl("Counter", false);
    let bump = b.method(counter, "bump", true, vec![], Type::Void, None);
    let holder = b.struct_decl("Holder", false);
    let counter_ty = Type::Struct(DeclRef::direct(counter));
    let cnt = b.property(
        holder,
        "cnt",
        counter_ty.clone(),
        &[AccessorKind::Get, AccessorKind::Set],
    );

    let holder_ty = Type::Struct(DeclRef::direct(holder));
    let (hv, h_stmt) = b.local("holder", holder_ty.clone(), None);
    let base = b.var(hv, holder_ty);
    let prop = b.member(base, DeclRef::direct(cnt), counter_ty);
    let callee = b.member(prop, DeclRef::direct(bump), Type::Void);
    let call = b.call(callee, vec![], Type::Void);
    let call_stmt = b.expr_stmt(call);
    let body = b.block(vec![h_stmt, call_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let body = h::func_body(&unit.ir, "main");

    // Read the property into a temporary, mutate the temporary through
    // `this`, then push the updated value back through the setter.
    let insts = h::insts_in_order(body);
    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::Load, Op::Call, Op::Var, Op::Store, Op::Call, Op::Load, Op::Call] => {}
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    let calls: Vec<InstId> = insts
        .iter()
        .copied()
        .filter(|i| body.inst(*i).op == Op::Call)
        .collect();
    assert_eq!(
        body.inst(calls[0]).operands[0],
        Operand::Global(h::global(&unit.ir, "cnt.get"))
    );
    assert_eq!(
        body.inst(calls[1]).operands,
        vec![
            Operand::Global(h::global(&unit.ir, "bump")),
            Operand::Inst(insts[3]),
        ]
    );
    assert_eq!(
        body.inst(calls[2]).operands,
        vec![
            Operand::Global(h::global(&unit.ir, "cnt.set")),
            Operand::Inst(insts[0]),
            Operand::Inst(insts[6]),
        ]
    );
}
