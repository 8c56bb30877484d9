//! Pipe stage dispatch and the built-in handlers.
//!
//! A pipe handler receives the value flowing into its stage and a
//! [`PipeContext`] that evaluates the stage's predicate block. Each
//! evaluation runs in a fresh scope holding the bindings the handler passes
//! in, so `$item`, `$index` and friends never leak between elements.

use crate::{
    bytecode::Bytecode,
    value::{Map, Value},
    vm::{Vm, VmError},
};

/// Handle a pipe handler uses to run its stage's predicate block.
pub struct PipeContext<'a> {
    vm: &'a mut Vm,
    bytecode: &'a Bytecode,
    block: usize,
    context: &'a Map,
    pipe_type: &'a str,
}

impl<'a> PipeContext<'a> {
    pub(crate) fn new(
        vm: &'a mut Vm,
        bytecode: &'a Bytecode,
        block: usize,
        context: &'a Map,
        pipe_type: &'a str,
    ) -> Self {
        PipeContext {
            vm,
            bytecode,
            block,
            context,
            pipe_type,
        }
    }

    /// Name the stage was written with (`map`, `filter`, `default`, ...).
    pub fn pipe_type(&self) -> &str {
        self.pipe_type
    }

    /// Evaluates the stage block with the given pipe-local bindings.
    pub fn eval(&mut self, bindings: &[(&str, Value)]) -> Result<Value, VmError> {
        let scope = bindings
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        self.vm
            .eval_block(self.bytecode, self.block, self.context, scope)
    }

    /// Evaluates the stage block for one element, binding `$item` and
    /// `$index`.
    pub fn eval_item(&mut self, item: &Value, index: usize) -> Result<Value, VmError> {
        self.eval(&[("$item", item.clone()), ("$index", Value::from(index))])
    }

    /// Borrows the stage input as an array or reports a pipe input error.
    pub fn expect_array<'v>(&self, input: &'v Value) -> Result<&'v [Value], VmError> {
        input.as_array().ok_or_else(|| VmError::PipeInput {
            pipe: self.pipe_type.to_string(),
            expected: "an array",
            got: input.type_name(),
        })
    }
}

/// Handler for `|:`. Evaluates the stage once with `$last` bound to the stage input.
pub fn default_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    ctx.eval(&[("$last", input)])
}

/// Handler for `|map:`. Evaluates the stage once per element and collects the results.
pub fn map_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut output = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        output.push(ctx.eval_item(item, index)?);
    }
    Ok(Value::Array(output))
}
