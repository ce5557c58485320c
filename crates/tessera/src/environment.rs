//! Execution state for one render, and the work-list that walks the tree.

use std::collections::HashMap;
use std::io::Write;
use std::mem;
use std::sync::Arc;

use tessera_ast::{ElementId, ElementKind, ElementRef, Expression, Node, Template};
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::eval::{evaluate_at, too_deep};
use crate::execute::accept;
use crate::template_loader::TemplateLoader;
use crate::value::Value;

/// Deepest nesting of macro calls and includes a render allows. `?eval`
/// fragments count toward it too.
pub const MAX_NESTING_DEPTH: usize = 100;

/// A macro definition and the template that owns it.
#[derive(Clone)]
pub(crate) struct MacroRef {
    pub(crate) template: Arc<Template>,
    pub(crate) id: ElementId,
}

/// Children of one element still waiting to be run.
struct Frame<'t> {
    children: &'t [ElementId],
    next: usize,
}

/// Per-render state: output sink, variables, macros and the include loader.
///
/// A compiled [`Template`] is shared and never changes; everything that does
/// change while rendering lives here, one environment per render.
pub struct Environment<'w> {
    out: &'w mut dyn Write,
    context: Context,
    macros: HashMap<String, MacroRef>,
    loader: Option<TemplateLoader>,
    captures: Vec<String>,
    /// Descriptions of the list, macro call, include and capture elements
    /// currently running, outermost first. Not unwound when an error
    /// propagates, so the state at the fault survives until `process` reads
    /// it.
    instruction_stack: Vec<String>,
    /// Macro calls and includes currently running.
    nesting: usize,
}

impl<'w> Environment<'w> {
    pub fn new(out: &'w mut dyn Write, data: Value, loader: Option<TemplateLoader>) -> Result<Self> {
        Ok(Self {
            out,
            context: Context::new(data)?,
            macros: HashMap::new(),
            loader,
            captures: Vec::new(),
            instruction_stack: Vec::new(),
            nesting: 0,
        })
    }

    /// Run a whole template. The first error halts the walk and is returned
    /// with the instruction trace at the point of failure.
    pub fn process(&mut self, template: &Arc<Template>) -> Result<()> {
        debug!(template = template.name().unwrap_or("<nameless>"), "processing");
        self.register_macros(template);
        let result = self.visit(template.root());
        if let Err(mut err) = result {
            let mut trace = mem::take(&mut self.instruction_stack);
            trace.reverse();
            err.attach_trace(trace);
            debug!(error = %err, "processing halted");
            return Err(err);
        }
        self.out.flush()?;
        Ok(())
    }

    /// Accept `element`, then run whatever it hands back.
    pub fn visit<'t>(&mut self, element: ElementRef<'t>) -> Result<()> {
        match self.execute(element)? {
            Some(children) => self.run(element, children),
            None => Ok(()),
        }
    }

    /// Run the children of `element` without accepting `element` itself.
    /// Used by elements that run their body more than once, or in a
    /// modified environment.
    pub fn visit_children<'t>(&mut self, element: ElementRef<'t>) -> Result<()> {
        match element.child_buffer() {
            Some(children) => self.run(element, children),
            None => Ok(()),
        }
    }

    fn run<'t>(&mut self, anchor: ElementRef<'t>, children: &'t [ElementId]) -> Result<()> {
        let mut frames = vec![Frame { children, next: 0 }];
        while let Some(frame) = frames.last_mut() {
            let Some(&id) = frame.children.get(frame.next) else {
                frames.pop();
                continue;
            };
            frame.next += 1;
            if let Some(children) = self.execute(anchor.element(id))? {
                frames.push(Frame { children, next: 0 });
            }
        }
        Ok(())
    }

    fn execute<'t>(&mut self, element: ElementRef<'t>) -> Result<Option<&'t [ElementId]>> {
        trace!(element = %element.id(), kind = element.kind().node_name(), "accept");
        let shown = element.is_shown_in_stack_trace();
        if shown {
            self.instruction_stack
                .push(format!("{} [at {}]", element.description(), element.location()));
        }
        let next = accept(element, self)?;
        if shown {
            self.instruction_stack.pop();
        }
        Ok(next)
    }

    /// Write to the innermost capture, or to the output.
    pub fn write(&mut self, text: &str) -> Result<()> {
        match self.captures.last_mut() {
            Some(buffer) => buffer.push_str(text),
            None => self.out.write_all(text.as_bytes())?,
        }
        Ok(())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Evaluates `expression` in the current context. `?eval` fragments count
    /// toward the nesting limit on top of the running macro calls and includes.
    pub(crate) fn evaluate(&self, expression: &Expression) -> Result<Value> {
        evaluate_at(expression, &self.context, self.nesting)
    }

    /// Enters a macro call or include at `node`, failing there once
    /// [`MAX_NESTING_DEPTH`] levels are already running.
    pub(crate) fn enter(&mut self, node: &dyn Node) -> Result<()> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(too_deep(node));
        }
        self.nesting += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    pub(crate) fn begin_capture(&mut self) {
        self.captures.push(String::new());
    }

    pub(crate) fn end_capture(&mut self) -> String {
        self.captures.pop().unwrap_or_default()
    }

    pub(crate) fn find_macro(&self, name: &str) -> Option<MacroRef> {
        self.macros.get(name).cloned()
    }

    /// Makes every macro defined in `template` callable, wherever the
    /// definition sits in the tree.
    fn register_macros(&mut self, template: &Arc<Template>) {
        for element in template.descendants() {
            if let ElementKind::Macro(definition) = element.kind() {
                trace!(name = %definition.name, "registering macro");
                self.macros.insert(
                    definition.name.clone(),
                    MacroRef {
                        template: Arc::clone(template),
                        id: element.id(),
                    },
                );
            }
        }
    }

    /// Load the template at `name` and run it in the current context.
    pub(crate) fn include(&mut self, name: &str) -> Result<()> {
        let template = match &self.loader {
            Some(loader) => loader.load(name)?,
            None => {
                return Err(TemplateError::include(format!(
                    "cannot include '{name}': no include root configured"
                )))
            }
        };
        self.register_macros(&template);

        if let Some(loader) = self.loader.as_mut() {
            loader.begin_include(name);
        }
        let result = self.visit(template.root());
        if let Some(loader) = self.loader.as_mut() {
            loader.end_include();
        }
        result
    }
}
