use super::*;

use crate::ast::{ScalarKind, Stage, Subst, Val};
use crate::diag::Severity;
use crate::ir::IrModule;
use crate::test_helpers as h;

fn count_globals(ir: &IrModule, pred: impl Fn(&IrGlobalKind) -> bool) -> usize {
    ir.values.iter().filter(|v| pred(&v.kind)).count()
}

fn find_global_by(ir: &IrModule, pred: impl Fn(&IrGlobalKind) -> bool) -> Option<ValueId> {
    (0..ir.values.len())
        .map(|i| ValueId(i as u32))
        .find(|v| pred(&ir.value(*v).kind))
}

#[test]
fn test_specialization_is_memoized() {
    let mut b = h::ModuleBuilder::new();
    let t = b.type_param("T");
    let boxd = b.struct_decl("Box", false);
    let g = b.generic("Box.generic", vec![t], boxd);

    let spec = Type::Struct(DeclRef::generic_app(boxd, g, vec![Val::Type(Type::float())]));
    let (_, x0) = b.local("x0", spec.clone(), None);
    let (_, x1) = b.local("x1", spec.clone(), None);
    let (_, x2) = b.local("x2", spec, None);
    let body = b.block(vec![x0, x1, x2]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);

    // One generic shell, one specialization, no matter how many uses.
    assert_eq!(
        count_globals(&unit.ir, |k| matches!(k, IrGlobalKind::Specialize { .. })),
        1
    );
    assert_eq!(
        count_globals(&unit.ir, |k| matches!(k, IrGlobalKind::Generic(_))),
        1
    );
    assert_eq!(
        count_globals(&unit.ir, |k| matches!(k, IrGlobalKind::GenericParam { .. })),
        1
    );
    let generic =
        find_global_by(&unit.ir, |k| matches!(k, IrGlobalKind::Generic(_))).expect("shell");
    let gen = match &unit.ir.value(generic).kind {
        IrGlobalKind::Generic(gen) => gen,
        _ => unreachable!(),
    };
    assert_eq!(gen.params.len(), 1);
    let struct_val = h::global(&unit.ir, "Box");
    assert_eq!(gen.inner, Some(IrArg::Value(struct_val)));

    let body = h::func_body(&unit.ir, "main");
    let slot_tys: Vec<TyId> = h::insts_in_order(body)
        .iter()
        .filter(|i| body.inst(**i).op == crate::ir::Op::Var)
        .map(|i| body.inst(*i).ty)
        .collect();
    assert_eq!(slot_tys.len(), 3);
    assert!(slot_tys.iter().all(|ty| *ty == slot_tys[0]));
}

#[test]
fn test_repeated_int_argument_shares_one_constant() {
    let mut b = h::ModuleBuilder::new();
    let n = b.value_param("N", Type::int());
    let arr = b.struct_decl("Arr", false);
    let g = b.generic("Arr.generic", vec![n], arr);

    let spec = Type::Struct(DeclRef::generic_app(arr, g, vec![Val::Int(4)]));
    let (_, x0) = b.local("x0", spec.clone(), None);
    let (_, x1) = b.local("x1", spec, None);
    let body = b.block(vec![x0, x1]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);

    // Both references lower the argument `4` to the same constant, so the
    // specialization cache sees one key and emits one application.
    assert_eq!(
        count_globals(&unit.ir, |k| matches!(k, IrGlobalKind::ConstInt { .. })),
        1
    );
    assert_eq!(
        count_globals(&unit.ir, |k| matches!(k, IrGlobalKind::Specialize { .. })),
        1
    );
    let four = find_global_by(&unit.ir, |k| {
        matches!(k, IrGlobalKind::ConstInt { value: 4 })
    })
    .expect("constant");
    let spec_val =
        find_global_by(&unit.ir, |k| matches!(k, IrGlobalKind::Specialize { .. }))
            .expect("specialization");
    match &unit.ir.value(spec_val).kind {
        IrGlobalKind::Specialize { args, .. } => {
            assert_eq!(args, &vec![IrArg::Value(four)]);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_nested_generics_specialize_outside_in() {
    let mut b = h::ModuleBuilder::new();
    let t = b.type_param("T");
    let u = b.type_param("U");
    let p = b.struct_decl("P", false);
    let inner_g = b.generic("P.inner", vec![u], p);
    let outer_g = b.generic("P.outer", vec![t], inner_g);

    let dr = DeclRef {
        decl: p,
        substs: vec![
            Subst::Generic {
                generic: outer_g,
                args: vec![Val::Type(Type::float())],
            },
            Subst::Generic {
                generic: inner_g,
                args: vec![Val::Type(Type::int())],
            },
        ],
    };
    let spec = Type::Struct(dr);
    let (_, x0) = b.local("x0", spec.clone(), None);
    let (_, x1) = b.local("x1", spec, None);
    let body = b.block(vec![x0, x1]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    println!("{}", unit.ir);

    assert_eq!(
        count_globals(&unit.ir, |k| matches!(k, IrGlobalKind::Generic(_))),
        2
    );
    let p_val = h::global(&unit.ir, "P");
    let inner = find_global_by(&unit.ir, |k| {
        matches!(k, IrGlobalKind::Generic(g) if g.inner == Some(IrArg::Value(p_val)))
    })
    .expect("inner shell");
    let outer = find_global_by(&unit.ir, |k| {
        matches!(k, IrGlobalKind::Generic(g) if g.inner == Some(IrArg::Value(inner)))
    })
    .expect("outer shell");

    let specs: Vec<(ValueId, ValueId)> = (0..unit.ir.values.len())
        .map(|i| ValueId(i as u32))
        .filter_map(|v| match &unit.ir.value(v).kind {
            IrGlobalKind::Specialize { base, .. } => Some((v, *base)),
            _ => None,
        })
        .collect();
    assert_eq!(specs.len(), 2);
    // Outermost substitution applies first, then the inner one applies to
    // the result.
    assert_eq!(specs[0].1, outer);
    assert_eq!(specs[1].1, specs[0].0);
}

#[test]
fn test_conformance_lowers_to_witness_table() {
    let mut b = h::ModuleBuilder::new();
    let area = b.func("area", vec![], Type::float(), None);
    let ishape = b.interface_decl("IShape", vec![area]);
    let circle = b.struct_decl("Circle", false);
    let impl_fn = b.func("circle_area", vec![], Type::float(), None);
    b.conformance(
        "Circle:IShape",
        Type::Struct(DeclRef::direct(circle)),
        ishape,
        vec![(area, Satisfaction::Value(DeclRef::direct(impl_fn)))],
    );

    let unit = b.lower();
    println!("{}", unit.ir);

    let table = h::global(&unit.ir, "Circle:IShape");
    let (interface, entries) = match &unit.ir.value(table).kind {
        IrGlobalKind::WitnessTable { interface, entries } => (*interface, entries.clone()),
        other => panic!("not a witness table: {:?}", other),
    };
    let reqs = match &unit.ir.value(interface).kind {
        IrGlobalKind::InterfaceType { requirements } => requirements.clone(),
        other => panic!("not an interface: {:?}", other),
    };
    // Table entries are keyed by the interface's requirement keys, in order.
    assert_eq!(entries.len(), 1);
    assert_eq!(reqs, vec![entries[0].0]);
    assert_eq!(
        entries[0].1,
        IrArg::Value(h::global(&unit.ir, "circle_area"))
    );
    assert_eq!(
        *unit.ir.types.kind(unit.ir.value(table).ty),
        IrType::WitnessTable { interface }
    );
}

#[test]
fn test_differentiable_conformance_attaches_zero_method() {
    let mut b = h::ModuleBuilder::new();
    let dzero = b.func("dzero", vec![], Type::float(), None);
    let idiff = b.interface_decl("IDifferentiable", vec![dzero]);
    let point = b.struct_decl("Point", false);
    let zf = b.func("point_zero", vec![], Type::Struct(DeclRef::direct(point)), None);
    b.conformance(
        "Point:IDifferentiable",
        Type::Struct(DeclRef::direct(point)),
        idiff,
        vec![(dzero, Satisfaction::Value(DeclRef::direct(zf)))],
    );

    let unit = b.lower();
    let point_val = h::global(&unit.ir, "Point");
    let zero = unit.ir.find_decoration(point_val, |d| match d {
        Decoration::ZeroMethod(f) => Some(*f),
        _ => None,
    });
    assert_eq!(zero, Some(h::global(&unit.ir, "point_zero")));
}

#[test]
fn test_entry_point_rejects_output_parameters() {
    let mut b = h::ModuleBuilder::new();
    let p = b.param("color", Type::vector(ScalarKind::Float, 4), ParamDir::Out);
    let body = b.block(vec![]);
    let frag = b.func("frag", vec![p], Type::Void, Some(body));
    b.entry(frag, Stage::Fragment);

    let unit = b.lower();
    assert_eq!(unit.error_count, 1);
    assert_eq!(unit.diagnostics[0].code, DiagCode::MissingInputDecoration);
    assert_eq!(unit.diagnostics[0].severity, Severity::Error);

    let frag_val = h::global(&unit.ir, "frag");
    let stage = unit.ir.find_decoration(frag_val, |d| match d {
        Decoration::EntryPoint { stage, .. } => Some(*stage),
        _ => None,
    });
    assert_eq!(stage, Some(Stage::Fragment));
}

#[test]
fn test_global_variable_constant_init_and_read() {
    let mut b = h::ModuleBuilder::new();
    let init = b.float(2.0);
    let gain = b.global_var("gain", Type::float(), Some(init));
    b.export(gain);

    let read = b.var(gain, Type::float());
    let (_, y_stmt) = b.local("y", Type::float(), Some(read));
    let body = b.block(vec![y_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let mut unit = b.lower();
    println!("{}", unit.ir);
    let gv = h::global(&unit.ir, "gain");
    match &unit.ir.value(gv).kind {
        IrGlobalKind::GlobalVar { init } => assert_eq!(*init, Some(Const::float(2.0))),
        other => panic!("not a global variable: {:?}", other),
    }
    assert!(unit
        .ir
        .find_decoration(gv, |d| match d {
            Decoration::Export => Some(()),
            _ => None,
        })
        .is_some());
    let f32_ty = unit.ir.types.intern(IrType::Float { bits: 32 });
    let ptr_ty = unit.ir.types.intern(IrType::Ptr { pointee: f32_ty });
    assert_eq!(unit.ir.value(gv).ty, ptr_ty);

    let body = h::func_body(&unit.ir, "main");
    assert!(h::find_inst(body, |i| {
        i.op == crate::ir::Op::Load && i.operands == vec![Operand::Global(gv)]
    })
    .is_some());
}

#[test]
fn test_struct_fields_lower_in_index_order() {
    let mut b = h::ModuleBuilder::new();
    let q = b.struct_decl("Q", false);
    b.field(q, "a", Type::float());
    b.field(q, "b", Type::bool());
    let q_ty = Type::Struct(DeclRef::direct(q));

    let (_, q_stmt) = b.local("q", q_ty, None);
    let body = b.block(vec![q_stmt]);
    let main = b.func("main", vec![], Type::Void, Some(body));
    b.export(main);

    let unit = b.lower();
    let q_val = h::global(&unit.ir, "Q");
    let fields = match &unit.ir.value(q_val).kind {
        IrGlobalKind::StructType { fields } => fields.clone(),
        other => panic!("not a struct type: {:?}", other),
    };
    assert_eq!(fields.len(), 2);
    assert_eq!(*unit.ir.types.kind(fields[0]), IrType::Float { bits: 32 });
    assert_eq!(*unit.ir.types.kind(fields[1]), IrType::Bool);
}
