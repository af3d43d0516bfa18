//! AST → bytecode lowering.
//!
//! `and`/`or` are re-lowered to conditional jumps here rather than kept as
//! eager binary opcodes (the Open Question resolution recorded in
//! DESIGN.md), so short-circuit evaluation falls naturally out of the
//! jump structure instead of needing special-cased VM opcodes.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::ast::{BinOp, CaseArm, CatchClause, ClassDef, Expr, FStringSegment, FuncDef, Stmt, StmtKind, UnOp};
use crate::errors::{CodegenError, Position};

use super::builder::{ConstPool, GlobalTable, InstrBuilder};
use super::code::{ClassProto, Code, Constant, FunctionProto};
use super::op::{Instruction, Opcode};

pub fn compile(program: &[Stmt]) -> Result<Code, CodegenError> {
    let mut compiler = Compiler {
        const_pool: ConstPool::default(),
        globals: GlobalTable::default(),
        functions: IndexMap::new(),
        classes: IndexMap::new(),
        known_functions: HashSet::new(),
        known_classes: HashSet::new(),
    };
    compiler.collect_names(program);

    let mut main_builder = InstrBuilder::default();
    let mut top_scope = Scope::global();
    for stmt in program {
        compiler.compile_stmt(stmt, &mut top_scope, &mut main_builder)?;
    }
    main_builder.emit_bare(Opcode::Halt);

    Ok(Code {
        constants: compiler.const_pool.into_vec(),
        globals: compiler.globals.into_vec(),
        functions: compiler.functions,
        classes: compiler.classes,
        instructions: main_builder.finish(),
    })
}

/// Local-variable resolution for one function body, or the (local-free)
/// top-level scope. Functions do not close over enclosing locals — only
/// globals and their own params/declarations are visible, a deliberate
/// simplification recorded in DESIGN.md.
struct Scope {
    is_function: bool,
    locals: IndexMap<String, u32>,
}

impl Scope {
    fn global() -> Self {
        Self { is_function: false, locals: IndexMap::new() }
    }

    fn function() -> Self {
        Self { is_function: true, locals: IndexMap::new() }
    }

    fn declare_local(&mut self, name: &str) -> u32 {
        if let Some(&slot) = self.locals.get(name) {
            return slot;
        }
        let slot = self.locals.len() as u32;
        self.locals.insert(name.to_string(), slot);
        slot
    }
}

struct Compiler {
    const_pool: ConstPool,
    globals: GlobalTable,
    functions: IndexMap<String, FunctionProto>,
    classes: IndexMap<String, ClassProto>,
    known_functions: HashSet<String>,
    known_classes: HashSet<String>,
}

impl Compiler {
    /// Pre-pass so forward references (a function calling one defined
    /// later in the file) resolve correctly.
    fn collect_names(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::FuncDef(f) => {
                    self.known_functions.insert(f.name.clone());
                }
                StmtKind::ClassDef(c) => {
                    self.known_classes.insert(c.name.clone());
                    for m in &c.methods {
                        self.known_functions.insert(format!("{}.{}", c.name, m.name));
                    }
                }
                _ => {}
            }
        }
    }

    fn const_idx(&mut self, c: Constant) -> i64 {
        self.const_pool.add(c) as i64
    }

    fn global_idx(&mut self, name: &str) -> i64 {
        self.globals.add(name) as i64
    }

    // ---- statements --------------------------------------------------

    fn compile_stmts(&mut self, stmts: &[Stmt], scope: &mut Scope, b: &mut InstrBuilder) -> Result<(), CodegenError> {
        for stmt in stmts {
            self.compile_stmt(stmt, scope, b)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, scope: &mut Scope, b: &mut InstrBuilder) -> Result<(), CodegenError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.compile_expr(expr, scope, b, stmt.pos)?;
                b.emit_bare(Opcode::Pop);
            }
            StmtKind::VarDecl { name, value } => {
                match value {
                    Some(v) => self.compile_expr(v, scope, b, stmt.pos)?,
                    None => {
                        let idx = self.const_idx(Constant::Nil);
                        b.emit(Opcode::LoadConst, idx);
                    }
                }
                if scope.is_function {
                    let slot = scope.declare_local(name);
                    b.emit(Opcode::StoreLocal, i64::from(slot));
                } else {
                    let idx = self.global_idx(name);
                    b.emit(Opcode::StoreGlobal, idx);
                }
            }
            StmtKind::Assign { name, value } => {
                self.compile_expr(value, scope, b, stmt.pos)?;
                self.compile_store_name(name, scope, b);
            }
            StmtKind::AttrAssign { object, name, value } => {
                self.compile_expr(object, scope, b, stmt.pos)?;
                self.compile_expr(value, scope, b, stmt.pos)?;
                let idx = self.const_idx(Constant::Str(name.clone()));
                b.emit(Opcode::SetAttr, idx);
            }
            StmtKind::IndexAssign { object, index, value } => {
                self.compile_expr(object, scope, b, stmt.pos)?;
                self.compile_expr(index, scope, b, stmt.pos)?;
                self.compile_expr(value, scope, b, stmt.pos)?;
                b.emit_bare(Opcode::SetItem);
            }
            StmtKind::FuncDef(f) => self.compile_func_def(f, None)?,
            StmtKind::ClassDef(c) => self.compile_class_def(c, b)?,
            StmtKind::If { branches, else_branch } => self.compile_if(branches, else_branch, scope, b, stmt.pos)?,
            StmtKind::While { cond, body } => self.compile_while(cond, body, scope, b, stmt.pos)?,
            StmtKind::RepeatWhile { body, cond } => self.compile_repeat_while(body, cond, scope, b, stmt.pos)?,
            StmtKind::For { var, iterable, body } => self.compile_for(var, iterable, body, scope, b, stmt.pos)?,
            StmtKind::Switch { scrutinee, cases, default } => {
                self.compile_switch(scrutinee, cases, default, scope, b, stmt.pos)?;
            }
            StmtKind::Import(spec) => self.compile_import(spec, b)?,
            StmtKind::Return(value) => {
                match value {
                    Some(v) => self.compile_expr(v, scope, b, stmt.pos)?,
                    None => {
                        let idx = self.const_idx(Constant::Nil);
                        b.emit(Opcode::LoadConst, idx);
                    }
                }
                b.emit_bare(Opcode::Return);
            }
            StmtKind::Break => {
                if !b.in_loop() {
                    return Err(CodegenError::new("'break' outside of loop", stmt.pos));
                }
                let idx = b.emit_jump_placeholder(Opcode::Jump);
                b.record_break(idx);
            }
            StmtKind::Continue => {
                if !b.in_loop() {
                    return Err(CodegenError::new("'continue' outside of loop", stmt.pos));
                }
                let idx = b.emit_jump_placeholder(Opcode::Jump);
                b.record_continue(idx);
            }
            StmtKind::Try { body, catches, finally } => {
                self.compile_try(body, catches, finally, scope, b, stmt.pos)?;
            }
            StmtKind::Throw(expr) => {
                self.compile_expr(expr, scope, b, stmt.pos)?;
                b.emit_bare(Opcode::Throw);
            }
        }
        Ok(())
    }

    fn compile_store_name(&mut self, name: &str, scope: &Scope, b: &mut InstrBuilder) {
        if let Some(&slot) = scope.locals.get(name) {
            b.emit(Opcode::StoreLocal, i64::from(slot));
        } else {
            let idx = self.global_idx(name);
            b.emit(Opcode::StoreGlobal, idx);
        }
    }

    fn compile_if(
        &mut self,
        branches: &[(Expr, Vec<Stmt>)],
        else_branch: &Option<Vec<Stmt>>,
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        let mut end_jumps = Vec::new();
        for (cond, body) in branches {
            self.compile_expr(cond, scope, b, pos)?;
            let skip = b.emit_jump_placeholder(Opcode::JumpIfFalse);
            self.compile_stmts(body, scope, b)?;
            let end_jump = b.emit_jump_placeholder(Opcode::Jump);
            end_jumps.push(end_jump);
            b.patch_to_here(skip);
        }
        if let Some(body) = else_branch {
            self.compile_stmts(body, scope, b)?;
        }
        for idx in end_jumps {
            b.patch_to_here(idx);
        }
        Ok(())
    }

    fn compile_while(
        &mut self,
        cond: &Expr,
        body: &[Stmt],
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        b.push_loop();
        let cond_pos = b.pos() as i64;
        self.compile_expr(cond, scope, b, pos)?;
        let exit_jump = b.emit_jump_placeholder(Opcode::JumpIfFalse);
        self.compile_stmts(body, scope, b)?;
        b.emit(Opcode::Jump, cond_pos);
        b.patch_to_here(exit_jump);
        let patches = b.pop_loop();
        let here = b.pos() as i64;
        for idx in patches.breaks {
            b.patch(idx, here);
        }
        for idx in patches.continues {
            b.patch(idx, cond_pos);
        }
        Ok(())
    }

    fn compile_repeat_while(
        &mut self,
        body: &[Stmt],
        cond: &Expr,
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        b.push_loop();
        let body_pos = b.pos() as i64;
        self.compile_stmts(body, scope, b)?;
        let cond_pos = b.pos() as i64;
        self.compile_expr(cond, scope, b, pos)?;
        b.emit(Opcode::JumpIfTrue, body_pos);
        let patches = b.pop_loop();
        let here = b.pos() as i64;
        for idx in patches.breaks {
            b.patch(idx, here);
        }
        for idx in patches.continues {
            b.patch(idx, cond_pos);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &[Stmt],
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        self.compile_expr(iterable, scope, b, pos)?;
        b.emit_bare(Opcode::GetIter);
        b.push_loop();
        let loop_start = b.pos() as i64;
        let exit_jump = b.emit_jump_placeholder(Opcode::ForIter);
        self.compile_store_name(var, scope, b);
        self.compile_stmts(body, scope, b)?;
        b.emit(Opcode::Jump, loop_start);
        b.patch_to_here(exit_jump); // FOR_ITER already popped the exhausted iterator
        let patches = b.pop_loop();
        let here = b.pos() as i64;
        for idx in patches.breaks {
            b.patch(idx, here);
        }
        for idx in patches.continues {
            b.patch(idx, loop_start);
        }
        Ok(())
    }

    fn compile_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[CaseArm],
        default: &Option<Vec<Stmt>>,
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        self.compile_expr(scrutinee, scope, b, pos)?;
        let mut end_jumps = Vec::new();
        for arm in cases {
            b.emit_bare(Opcode::Dup);
            self.compile_expr(&arm.value, scope, b, pos)?;
            b.emit_bare(Opcode::Eq);
            let skip = b.emit_jump_placeholder(Opcode::JumpIfFalse);
            b.emit_bare(Opcode::Pop); // drop scrutinee copy before running the body
            self.compile_stmts(&arm.body, scope, b)?;
            let end_jump = b.emit_jump_placeholder(Opcode::Jump);
            end_jumps.push(end_jump);
            b.patch_to_here(skip);
        }
        b.emit_bare(Opcode::Pop); // no arm matched; drop the scrutinee
        if let Some(body) = default {
            self.compile_stmts(body, scope, b)?;
        }
        for idx in end_jumps {
            b.patch_to_here(idx);
        }
        Ok(())
    }

    fn compile_import(&mut self, spec: &crate::ast::ImportSpec, b: &mut InstrBuilder) -> Result<(), CodegenError> {
        let module_idx = self.const_idx(Constant::Str(spec.module.clone()));
        match &spec.items {
            None => {
                b.emit(Opcode::ImportModule, module_idx);
                let global_idx = self.global_idx(spec.module.split('.').next().unwrap_or(&spec.module));
                b.emit(Opcode::StoreGlobal, global_idx);
            }
            Some(items) => {
                for item in items {
                    b.emit(Opcode::ImportModule, module_idx);
                    let item_idx = self.const_idx(Constant::Str(item.clone()));
                    b.emit(Opcode::ImportFrom, item_idx);
                    let global_idx = self.global_idx(item);
                    b.emit(Opcode::StoreGlobal, global_idx);
                }
            }
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: &Option<Vec<Stmt>>,
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        b.emit_bare(Opcode::TryBegin);
        self.compile_stmts(body, scope, b)?;
        let try_end = b.emit_jump_placeholder(Opcode::TryEnd);

        let mut catch_end_jumps = Vec::new();
        for clause in catches {
            let type_idx = match &clause.exception_type {
                Some(name) => self.const_idx(Constant::Str(name.clone())),
                None => self.const_idx(Constant::Nil),
            };
            b.emit(Opcode::CatchBegin, type_idx);
            if let Some(binding) = &clause.binding {
                self.compile_store_name(binding, scope, b);
            } else {
                b.emit_bare(Opcode::Pop);
            }
            self.compile_stmts(&clause.body, scope, b)?;
            let end_jump = b.emit_jump_placeholder(Opcode::Jump);
            catch_end_jumps.push(end_jump);
            b.emit_bare(Opcode::CatchEnd);
        }
        b.patch_to_here(try_end);
        for idx in catch_end_jumps {
            b.patch_to_here(idx);
        }

        if let Some(body) = finally {
            b.emit_bare(Opcode::FinallyBegin);
            self.compile_stmts(body, scope, b)?;
            b.emit_bare(Opcode::FinallyEnd);
        }
        let _ = pos;
        Ok(())
    }

    // ---- functions / classes ------------------------------------------

    fn compile_func_def(&mut self, f: &FuncDef, owner_class: Option<&str>) -> Result<(), CodegenError> {
        let mut scope = Scope::function();
        for p in &f.params {
            scope.declare_local(&p.name);
        }
        let mut b = InstrBuilder::default();
        self.compile_stmts(&f.body, &mut scope, &mut b)?;
        // Implicit `return nil` for bodies not ending in an explicit return.
        let idx = self.const_idx(Constant::Nil);
        b.emit(Opcode::LoadConst, idx);
        b.emit_bare(Opcode::Return);

        let qualified = match owner_class {
            Some(class_name) => format!("{class_name}.{}", f.name),
            None => f.name.clone(),
        };
        let params = f.params.iter().map(|p| p.name.clone()).collect();
        self.functions.insert(
            qualified.clone(),
            FunctionProto { name: qualified, params, local_vars: scope.locals, instructions: b.finish() },
        );
        Ok(())
    }

    /// `CreateClass` registers the class in the VM's flat class table and
    /// leaves a `Value::Class` on the stack, which we then bind globally
    /// so later `Ident` lookups of the class name resolve. This always
    /// runs during the global-initialization pass, per spec.md §4.5.
    fn compile_class_def(&mut self, c: &ClassDef, b: &mut InstrBuilder) -> Result<(), CodegenError> {
        for method in &c.methods {
            self.compile_func_def(method, Some(&c.name))?;
        }
        self.classes.insert(
            c.name.clone(),
            ClassProto {
                name: c.name.clone(),
                parent: c.parent.clone(),
                methods: c.methods.iter().map(|m| format!("{}.{}", c.name, m.name)).collect(),
            },
        );
        let class_idx = self.const_idx(Constant::Str(c.name.clone()));
        b.emit(Opcode::CreateClass, class_idx);
        let global_idx = self.global_idx(&c.name);
        b.emit(Opcode::StoreGlobal, global_idx);
        Ok(())
    }

    // ---- expressions ----------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr, scope: &mut Scope, b: &mut InstrBuilder, pos: Position) -> Result<(), CodegenError> {
        match expr {
            Expr::Int(i) => {
                let idx = self.const_idx(Constant::Int(*i));
                b.emit(Opcode::LoadConst, idx);
            }
            Expr::Float(x) => {
                let idx = self.const_idx(Constant::Float(*x));
                b.emit(Opcode::LoadConst, idx);
            }
            Expr::Str(s) => {
                let idx = self.const_idx(Constant::Str(s.clone()));
                b.emit(Opcode::LoadConst, idx);
            }
            Expr::Bool(v) => {
                let idx = self.const_idx(Constant::Bool(*v));
                b.emit(Opcode::LoadConst, idx);
            }
            Expr::Nil => {
                let idx = self.const_idx(Constant::Nil);
                b.emit(Opcode::LoadConst, idx);
            }
            Expr::FString(segments) => self.compile_fstring(segments, scope, b, pos)?,
            Expr::Ident(name) => self.compile_load_ident(name, scope, b),
            Expr::Binary { op: BinOp::And, lhs, rhs } => {
                self.compile_expr(lhs, scope, b, pos)?;
                b.emit_bare(Opcode::Dup);
                let short_circuit = b.emit_jump_placeholder(Opcode::JumpIfFalse);
                b.emit_bare(Opcode::Pop);
                self.compile_expr(rhs, scope, b, pos)?;
                b.patch_to_here(short_circuit);
            }
            Expr::Binary { op: BinOp::Or, lhs, rhs } => {
                self.compile_expr(lhs, scope, b, pos)?;
                b.emit_bare(Opcode::Dup);
                let short_circuit = b.emit_jump_placeholder(Opcode::JumpIfTrue);
                b.emit_bare(Opcode::Pop);
                self.compile_expr(rhs, scope, b, pos)?;
                b.patch_to_here(short_circuit);
            }
            Expr::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs, scope, b, pos)?;
                self.compile_expr(rhs, scope, b, pos)?;
                b.emit_bare(binop_opcode(*op));
            }
            Expr::Unary { op: UnOp::Neg, expr } => {
                self.compile_expr(expr, scope, b, pos)?;
                let zero = self.const_idx(Constant::Int(0));
                b.emit(Opcode::LoadConst, zero);
                b.emit_bare(Opcode::RotTwo);
                b.emit_bare(Opcode::Sub);
            }
            Expr::Unary { op: UnOp::Not, expr } => {
                self.compile_expr(expr, scope, b, pos)?;
                b.emit_bare(Opcode::Not);
            }
            Expr::List(items) => {
                for item in items {
                    self.compile_expr(item, scope, b, pos)?;
                }
                b.emit(Opcode::BuildList, items.len() as i64);
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.compile_expr(item, scope, b, pos)?;
                }
                b.emit(Opcode::BuildTuple, items.len() as i64);
            }
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    self.compile_expr(k, scope, b, pos)?;
                    self.compile_expr(v, scope, b, pos)?;
                }
                b.emit(Opcode::BuildDict, entries.len() as i64);
            }
            Expr::ListComp { element, var, iterable, cond } => {
                self.compile_list_comp(element, var, iterable, cond, scope, b, pos)?;
            }
            Expr::Attr { object, name } => {
                self.compile_expr(object, scope, b, pos)?;
                let idx = self.const_idx(Constant::Str(name.clone()));
                b.emit(Opcode::GetAttr, idx);
            }
            Expr::Index { object, index } => {
                self.compile_expr(object, scope, b, pos)?;
                self.compile_expr(index, scope, b, pos)?;
                b.emit_bare(Opcode::GetItem);
            }
            Expr::Lambda { params, body } => self.compile_lambda(params, body)?,
            Expr::Call { callee, args } => self.compile_call(callee, args, scope, b, pos)?,
        }
        Ok(())
    }

    fn compile_load_ident(&mut self, name: &str, scope: &Scope, b: &mut InstrBuilder) {
        if let Some(&slot) = scope.locals.get(name) {
            b.emit(Opcode::LoadLocal, i64::from(slot));
            return;
        }
        if self.known_functions.contains(name) && !self.known_classes.contains(name) {
            let idx = self.const_pool.add(Constant::Str(name.to_string())) as i64;
            b.emit(Opcode::LoadFunc, idx);
            return;
        }
        let idx = self.globals.add(name) as i64;
        b.emit(Opcode::LoadGlobal, idx);
    }

    fn compile_fstring(
        &mut self,
        segments: &[FStringSegment],
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        if segments.is_empty() {
            let idx = self.const_idx(Constant::Str(String::new()));
            b.emit(Opcode::LoadConst, idx);
            return Ok(());
        }
        for (i, segment) in segments.iter().enumerate() {
            match segment {
                FStringSegment::Literal(text) => {
                    let idx = self.const_idx(Constant::Str(text.clone()));
                    b.emit(Opcode::LoadConst, idx);
                }
                FStringSegment::Expr(expr) => {
                    self.compile_expr(expr, scope, b, pos)?;
                    b.emit_bare(Opcode::FormatValue);
                }
            }
            if i > 0 {
                b.emit_bare(Opcode::Add);
            }
        }
        Ok(())
    }

    fn compile_list_comp(
        &mut self,
        element: &Expr,
        var: &str,
        iterable: &Expr,
        cond: &Option<Box<Expr>>,
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        b.emit(Opcode::BuildList, 0);
        self.compile_expr(iterable, scope, b, pos)?;
        b.emit_bare(Opcode::GetIter);
        b.push_loop();
        let loop_start = b.pos() as i64;
        let exit_jump = b.emit_jump_placeholder(Opcode::ForIter);
        if scope.is_function {
            let slot = scope.declare_local(var);
            b.emit(Opcode::StoreLocal, i64::from(slot));
        } else {
            let idx = self.global_idx(var);
            b.emit(Opcode::StoreGlobal, idx);
        }
        if let Some(cond) = cond {
            self.compile_expr(cond, scope, b, pos)?;
            let skip = b.emit_jump_placeholder(Opcode::JumpIfFalse);
            self.compile_expr(element, scope, b, pos)?;
            b.emit_bare(Opcode::ListAppend);
            b.patch_to_here(skip);
        } else {
            self.compile_expr(element, scope, b, pos)?;
            b.emit_bare(Opcode::ListAppend);
        }
        b.emit(Opcode::Jump, loop_start);
        b.patch_to_here(exit_jump); // FOR_ITER already popped the exhausted iterator
        let patches = b.pop_loop();
        for idx in patches.breaks.into_iter().chain(patches.continues) {
            b.patch(idx, loop_start);
        }
        Ok(())
    }

    fn compile_lambda(&mut self, params: &[String], body: &Expr) -> Result<(), CodegenError> {
        let name = format!("<lambda@{}>", self.functions.len());
        let mut scope = Scope::function();
        for p in params {
            scope.declare_local(p);
        }
        let mut b = InstrBuilder::default();
        self.compile_expr(body, &mut scope, &mut b, Position::default())?;
        b.emit_bare(Opcode::Return);
        self.functions.insert(
            name.clone(),
            FunctionProto {
                name: name.clone(),
                params: params.to_vec(),
                local_vars: scope.locals,
                instructions: b.finish(),
            },
        );
        self.known_functions.insert(name.clone());
        Ok(())
    }

    fn compile_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        scope: &mut Scope,
        b: &mut InstrBuilder,
        pos: Position,
    ) -> Result<(), CodegenError> {
        if let Expr::Ident(name) = callee {
            if self.known_classes.contains(name) {
                let class_idx = self.const_idx(Constant::Str(name.clone()));
                b.emit(Opcode::CreateObject, class_idx);
                for arg in args {
                    self.compile_expr(arg, scope, b, pos)?;
                }
                let method_idx = self.const_idx(Constant::Str("__init__".to_string()));
                b.emit(Opcode::CallMethod, Instruction::pack_call_method(args.len() as u32, method_idx as u32));
                return Ok(());
            }
        }
        if let Expr::Attr { object, name } = callee {
            self.compile_expr(object, scope, b, pos)?;
            for arg in args {
                self.compile_expr(arg, scope, b, pos)?;
            }
            let method_idx = self.const_idx(Constant::Str(name.clone()));
            b.emit(Opcode::CallMethod, Instruction::pack_call_method(args.len() as u32, method_idx as u32));
            return Ok(());
        }
        self.compile_expr(callee, scope, b, pos)?;
        for arg in args {
            self.compile_expr(arg, scope, b, pos)?;
        }
        b.emit(Opcode::Call, args.len() as i64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_source(src: &str) -> Code {
        let tokens = crate::lexer::lex(src).expect("source lexes");
        let program = crate::parser::parse(tokens).expect("source parses");
        compile(&program).expect("source compiles")
    }

    #[test]
    fn repeated_literals_share_one_constant_pool_slot() {
        let code = compile_source("print(1)\nprint(1)\nprint(1)\n");
        let ones = code.constants.iter().filter(|c| matches!(c, Constant::Int(1))).count();
        assert_eq!(ones, 1, "constant pool should dedup identical literals: {:?}", code.constants);
    }

    #[test]
    fn distinct_literals_get_distinct_slots() {
        let code = compile_source("print(1)\nprint(2)\nprint(\"1\")\n");
        assert!(code.constants.contains(&Constant::Int(1)));
        assert!(code.constants.contains(&Constant::Int(2)));
        assert!(code.constants.contains(&Constant::Str("1".to_string())));
    }

    #[test]
    fn function_without_explicit_return_gets_an_implicit_nil_return() {
        let code = compile_source("func noop():\n    var x = 1\n");
        let proto = code.functions.get("noop").expect("function was compiled");
        assert_eq!(proto.instructions.last().map(|i| i.op), Some(Opcode::Return));
    }
}

fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::Pow => Opcode::Pow,
        BinOp::Eq => Opcode::Eq,
        BinOp::Ne => Opcode::Ne,
        BinOp::Lt => Opcode::Lt,
        BinOp::Gt => Opcode::Gt,
        BinOp::Le => Opcode::Le,
        BinOp::Ge => Opcode::Ge,
        BinOp::In => Opcode::In,
        BinOp::And | BinOp::Or => unreachable!("and/or are lowered to jumps, not opcodes"),
    }
}
