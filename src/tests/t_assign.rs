use super::*;

use crate::ast::{DeclRef, ExprKind, ScalarKind, Type};
use crate::lower::{lower_module, LowerOptions};
use crate::test_helpers as h;

#[test]
fn test_storage_write_prefers_setter() {
    let mut b = h::ModuleBuilder::new();
    let s_decl = b.struct_decl("S", false);
    let p = b.property(
        s_decl,
        "p",
        Type::float(),
        &[AccessorKind::Get, AccessorKind::Set, AccessorKind::Ref],
    );
    let s_ty = Type::Struct(DeclRef::direct(s_decl));

    let (s_var, s_stmt) = b.local("s", s_ty.clone(), None);
    let base = b.var(s_var, s_ty);
    let left = b.member(base, DeclRef::direct(p), Type::float());
    let right = b.float(2.0);
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![s_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let setter = h::global(&unit.ir, "p.set");
    let body = h::func_body(&unit.ir, "main");

    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::Call] => {}
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    let slot = h::insts_in_order(body)[0];
    let call = h::find_inst(body, |i| i.op == Op::Call).expect("setter call");
    assert_eq!(
        body.inst(call).operands,
        vec![
            Operand::Global(setter),
            Operand::Inst(slot),
            Operand::Const(Const::float(2.0)),
        ]
    );
    // With a setter available, neither the getter nor the ref accessor is
    // needed for a plain write.
    assert!(h::find_global(&unit.ir, "p.get").is_none());
    assert!(h::find_global(&unit.ir, "p.ref").is_none());
}

#[test]
fn test_ref_accessor_yields_address_to_store_through() {
    let mut b = h::ModuleBuilder::new();
    let s_decl = b.struct_decl("S", false);
    let q = b.property(s_decl, "q", Type::float(), &[AccessorKind::Ref]);
    let s_ty = Type::Struct(DeclRef::direct(s_decl));

    let (s_var, s_stmt) = b.local("s", s_ty.clone(), None);
    let base = b.var(s_var, s_ty);
    let left = b.member(base, DeclRef::direct(q), Type::float());
    let right = b.float(3.0);
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![s_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let mut unit = b.lower();
    println!("{}", unit.ir);
    let f32_ty = unit.ir.types.intern(IrType::Float { bits: 32 });
    let ptr_ty = unit.ir.types.intern(IrType::Ptr { pointee: f32_ty });
    let refer = h::global(&unit.ir, "q.ref");
    let body = h::func_body(&unit.ir, "main");

    let call = h::find_inst(body, |i| i.op == Op::Call).expect("ref accessor call");
    assert_eq!(body.inst(call).operands[0], Operand::Global(refer));
    assert_eq!(body.inst(call).ty, ptr_ty);
    assert!(h::find_inst(body, |i| {
        i.op == Op::Store
            && i.operands == vec![Operand::Inst(call), Operand::Const(Const::float(3.0))]
    })
    .is_some());
}

#[test]
fn test_addressable_swizzle_assign_stores_in_place() {
    let mut b = h::ModuleBuilder::new();
    let vec2 = Type::vector(ScalarKind::Float, 2);

    let (v, v_stmt) = b.local("v", vec2.clone(), None);
    let base = b.var(v, vec2.clone());
    let left = b.swizzle(base, &[1, 0], vec2.clone());
    let e0 = b.float(1.0);
    let e1 = b.float(2.0);
    let right = b.expr(vec2, ExprKind::InitList(vec![e0, e1]));
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![v_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let body = h::func_body(&unit.ir, "main");

    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::MakeVector, Op::SwizzledStore { indices }] => {
            assert_eq!(indices, &vec![1, 0]);
        }
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    let insts = h::insts_in_order(body);
    assert_eq!(
        body.inst(insts[2]).operands,
        vec![Operand::Inst(insts[0]), Operand::Inst(insts[1])]
    );
    assert_eq!(
        h::count_insts(body, |i| matches!(i.op, Op::SwizzleSet { .. })),
        0
    );
}

#[test]
fn test_swizzle_of_storage_reads_modifies_writes() {
    let mut b = h::ModuleBuilder::new();
    let vec2 = Type::vector(ScalarKind::Float, 2);
    let s_decl = b.struct_decl("S", false);
    let p2 = b.property(
        s_decl,
        "p2",
        vec2.clone(),
        &[AccessorKind::Get, AccessorKind::Set],
    );
    let s_ty = Type::Struct(DeclRef::direct(s_decl));

    let (s_var, s_stmt) = b.local("s", s_ty.clone(), None);
    let base = b.var(s_var, s_ty);
    let prop = b.member(base, DeclRef::direct(p2), vec2.clone());
    let left = b.swizzle(prop, &[1, 0], vec2.clone());
    let e0 = b.float(1.0);
    let e1 = b.float(2.0);
    let right = b.expr(vec2, ExprKind::InitList(vec![e0, e1]));
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![s_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let getter = h::global(&unit.ir, "p2.get");
    let setter = h::global(&unit.ir, "p2.set");
    let body = h::func_body(&unit.ir, "main");

    // No address to write through: read the whole value, splice the lanes,
    // and write it back.
    let ops = h::ops_in_order(body);
    match &ops[..] {
        [Op::Var, Op::MakeVector, Op::Load, Op::Call, Op::SwizzleSet { indices }, Op::Call] => {
            assert_eq!(indices, &vec![1, 0]);
        }
        other => panic!("unexpected instruction sequence: {:?}", other),
    }
    let insts = h::insts_in_order(body);
    assert_eq!(body.inst(insts[3]).operands[0], Operand::Global(getter));
    assert_eq!(
        body.inst(insts[5]).operands,
        vec![
            Operand::Global(setter),
            Operand::Inst(insts[0]),
            Operand::Inst(insts[4]),
        ]
    );
    assert_eq!(
        h::count_insts(body, |i| matches!(i.op, Op::SwizzledStore { .. })),
        0
    );
}

#[test]
fn test_matrix_swizzle_assign_scatters_elements() {
    let mut b = h::ModuleBuilder::new();
    let vec2 = Type::vector(ScalarKind::Float, 2);
    let m_ty = Type::Matrix {
        elem: ScalarKind::Float,
        rows: 2,
        cols: 2,
    };

    let (m, m_stmt) = b.local("m", m_ty.clone(), None);
    let base = b.var(m, m_ty);
    let left = b.expr(
        vec2.clone(),
        ExprKind::MatrixSwizzle {
            base: Box::new(base),
            coords: vec![(0, 1), (1, 0)],
        },
    );
    let e0 = b.float(1.0);
    let e1 = b.float(2.0);
    let right = b.expr(vec2, ExprKind::InitList(vec![e0, e1]));
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![m_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let body = h::func_body(&unit.ir, "main");

    // One lane extract from the source per coordinate, two element address
    // steps (row, then column) per store.
    assert_eq!(h::count_insts(body, |i| i.op == Op::ElemExtract), 2);
    assert_eq!(h::count_insts(body, |i| i.op == Op::ElemAddr), 4);
    assert_eq!(h::count_insts(body, |i| i.op == Op::Store), 2);
}

#[test]
fn test_subscript_write_goes_through_setter() {
    let mut b = h::ModuleBuilder::new();
    let s_decl = b.struct_decl("S", false);
    let idx = b.param("i", Type::int(), crate::ast::ParamDir::In);
    b.subscript(
        s_decl,
        "item",
        vec![idx],
        Type::float(),
        &[AccessorKind::Get, AccessorKind::Set, AccessorKind::Ref],
    );
    let s_ty = Type::Struct(DeclRef::direct(s_decl));

    let (s_var, s_stmt) = b.local("s", s_ty.clone(), None);
    let base = b.var(s_var, s_ty);
    let one = b.int(1);
    let left = b.expr(
        Type::float(),
        ExprKind::Index {
            base: Box::new(base),
            args: vec![one],
        },
    );
    let right = b.float(2.0);
    let asg = b.assign(left, right);
    let asg_stmt = b.expr_stmt(asg);
    let body = b.block(vec![s_stmt, asg_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);
    let setter = h::global(&unit.ir, "item.set");
    let body = h::func_body(&unit.ir, "main");

    // Index arguments ride between `this` and the new value.
    let slot = h::insts_in_order(body)[0];
    let call = h::find_inst(body, |i| i.op == Op::Call).expect("setter call");
    assert_eq!(
        body.inst(call).operands,
        vec![
            Operand::Global(setter),
            Operand::Inst(slot),
            Operand::Const(Const::Int(1)),
            Operand::Const(Const::float(2.0)),
        ]
    );
    // The setter wins over the ref accessor for subscript writes too; the
    // ref accessor is never lowered.
    assert!(h::find_global(&unit.ir, "item.ref").is_none());
}

#[test]
fn test_assign_to_rvalue_is_fatal() {
    let mut b = h::ModuleBuilder::new();
    let one = b.int(1);
    let two = b.int(2);
    let bad = b.assign(one, two);
    let bad_stmt = b.expr_stmt(bad);
    let body = b.block(vec![bad_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let err = match lower_module(&b.module, LowerOptions::default()) {
        Err(err) => err,
        Ok(_) => panic!("lowering an assignment to a literal must fail"),
    };
    assert!(matches!(err.kind, LowerErrorKind::InvalidValFlavor));
}
