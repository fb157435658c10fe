//! Method body state: the instruction buffer, labels with their pending
//! fixups, the local allocator and the operand stack tracker.

use kiln_ir::{Access, Code, Handler, Signature, Type};

use crate::EmitError;

// ── Labels ──────────────────────────────────────────────────────────

/// A branch target within one method body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, Default)]
struct LabelSlot {
    pos: Option<u32>,
    /// Stack depth expected on entry, from the first branch or mark.
    depth: Option<u16>,
}

/// A 32-bit relative offset waiting for its label to be bound.
#[derive(Clone, Debug)]
struct Fixup {
    /// Position of the four operand bytes.
    at: usize,
    /// Offset of the instruction the operand is relative to.
    base: u32,
    label: Label,
}

#[derive(Clone, Debug)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<String>,
}

// ── Locals ──────────────────────────────────────────────────────────

/// A local variable slot together with its type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Local {
    index: u16,
    ty: Type,
}

impl Local {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

/// Monotonic slot allocator. Wide types take two slots; slots are never
/// reused within one body.
#[derive(Clone, Debug)]
pub(crate) struct LocalAllocator {
    next: u16,
}

impl LocalAllocator {
    fn new(first: u16) -> Self {
        Self { next: first }
    }

    fn allocate(&mut self, ty: &Type) -> Option<u16> {
        let index = self.next;
        self.next = self.next.checked_add(ty.size().max(1))?;
        Some(index)
    }

    pub(crate) fn max_locals(&self) -> u16 {
        self.next
    }
}

// ── Body ────────────────────────────────────────────────────────────

/// Everything known about one method while its code is being emitted.
#[derive(Clone, Debug)]
pub(crate) struct MethodBody {
    pub(crate) access: Access,
    pub(crate) sig: Signature,
    pub(crate) exceptions: Vec<String>,
    pub(crate) bytes: Vec<u8>,
    labels: Vec<LabelSlot>,
    fixups: Vec<Fixup>,
    handlers: Vec<PendingHandler>,
    locals: LocalAllocator,
    /// Slot of each declared parameter.
    arg_slots: Vec<u16>,
    /// Current operand stack depth; `None` after an unconditional transfer.
    depth: Option<u16>,
    max_stack: u16,
    /// First structural problem seen; reported by `finish`.
    error: Option<EmitError>,
}

impl MethodBody {
    pub(crate) fn new(access: Access, sig: Signature, exceptions: Vec<String>) -> Self {
        let mut next = u16::from(!access.is_static());
        let mut arg_slots = Vec::with_capacity(sig.desc().params().len());
        for param in sig.desc().params() {
            arg_slots.push(next);
            next = next.saturating_add(param.size());
        }
        Self {
            access,
            sig,
            exceptions,
            bytes: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            locals: LocalAllocator::new(next),
            arg_slots,
            depth: Some(0),
            max_stack: 0,
            error: None,
        }
    }

    pub(crate) fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub(crate) fn arg_slot(&self, index: usize) -> Option<u16> {
        self.arg_slots.get(index).copied()
    }

    pub(crate) fn pos(&self) -> u32 {
        u32::try_from(self.bytes.len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn depth(&self) -> Option<u16> {
        self.depth
    }

    pub(crate) fn fail(&mut self, err: EmitError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn alloc_local(&mut self, ty: Type) -> Local {
        if let Some(index) = self.locals.allocate(&ty) {
            Local { index, ty }
        } else {
            let method = self.sig.to_string();
            self.fail(EmitError::TooManyLocals { method });
            Local { index: 0, ty }
        }
    }

    // ── Stack tracking ──────────────────────────────────────────────

    /// Account for an instruction popping `pops` slots and pushing `pushes`.
    /// Code following an unconditional transfer without an intervening label
    /// is unreachable and is tracked from depth zero.
    pub(crate) fn stack(&mut self, pops: u16, pushes: u16) {
        let depth = self.depth.unwrap_or(0);
        let Some(after_pop) = depth.checked_sub(pops) else {
            let offset = self.pos();
            let method = self.sig.to_string();
            self.fail(EmitError::StackUnderflow { offset, method });
            self.depth = Some(pushes);
            return;
        };
        let after = after_pop.saturating_add(pushes);
        self.max_stack = self.max_stack.max(after);
        self.depth = Some(after);
    }

    /// Control does not fall through past the current point.
    pub(crate) fn unreachable(&mut self) {
        self.depth = None;
    }

    // ── Labels ──────────────────────────────────────────────────────

    pub(crate) fn new_label(&mut self) -> Label {
        let id = u32::try_from(self.labels.len()).unwrap_or(u32::MAX);
        self.labels.push(LabelSlot::default());
        Label(id)
    }

    /// Merge `depth` into the label's expected entry depth.
    fn join(&mut self, label: Label, depth: u16) {
        let offset = self.pos();
        match self.labels[label.index()].depth {
            None => self.labels[label.index()].depth = Some(depth),
            Some(expected) if expected != depth => {
                self.fail(EmitError::StackMismatch {
                    offset,
                    expected,
                    found: depth,
                });
            }
            Some(_) => {}
        }
    }

    /// Bind `label` to the current position.
    pub(crate) fn bind(&mut self, label: Label) {
        let pos = self.pos();
        if self.labels[label.index()].pos.is_some() {
            self.fail(EmitError::LabelRebound { label: label.raw() });
            return;
        }
        self.labels[label.index()].pos = Some(pos);
        if let Some(depth) = self.depth {
            self.join(label, depth);
        }
        self.depth = Some(self.labels[label.index()].depth.unwrap_or(0));
    }

    /// Bind `label` as an exception handler entry: the thrown value is the
    /// only stack entry.
    pub(crate) fn bind_handler(&mut self, label: Label) {
        self.depth = None;
        self.labels[label.index()].depth = Some(1);
        self.bind(label);
        self.max_stack = self.max_stack.max(1);
    }

    /// Record a branch to `label` taken with the current stack depth.
    pub(crate) fn branch_to(&mut self, label: Label) {
        let depth = self.depth.unwrap_or(0);
        self.join(label, depth);
    }

    /// Emit a four-byte placeholder to be patched with `label - base`.
    pub(crate) fn put_label_offset(&mut self, base: u32, label: Label) {
        let at = self.bytes.len();
        self.bytes.extend_from_slice(&[0; 4]);
        self.fixups.push(Fixup { at, base, label });
    }

    pub(crate) fn add_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<String>,
    ) {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    // ── Finishing ───────────────────────────────────────────────────

    fn resolve(&self, label: Label) -> Result<u32, EmitError> {
        self.labels[label.index()]
            .pos
            .ok_or_else(|| EmitError::UnboundLabel {
                label: label.raw(),
                method: self.sig.to_string(),
            })
    }

    /// Patch every branch, resolve handlers and freeze the code.
    pub(crate) fn finish(mut self) -> Result<Code, EmitError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if u32::try_from(self.bytes.len()).is_err() {
            return Err(EmitError::CodeTooLarge {
                method: self.sig.to_string(),
            });
        }

        for fixup in &self.fixups {
            let target = self.resolve(fixup.label)?;
            let rel = i64::from(target) - i64::from(fixup.base);
            let rel = i32::try_from(rel).map_err(|_| EmitError::CodeTooLarge {
                method: self.sig.to_string(),
            })?;
            self.bytes[fixup.at..fixup.at + 4].copy_from_slice(&rel.to_be_bytes());
        }

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for pending in &self.handlers {
            let start = self.resolve(pending.start)?;
            let end = self.resolve(pending.end)?;
            // An empty protected range can never throw.
            if start == end {
                continue;
            }
            handlers.push(Handler {
                start,
                end,
                handler: self.resolve(pending.handler)?,
                catch_type: pending.catch_type.clone(),
            });
        }

        Ok(Code {
            max_stack: self.max_stack,
            max_locals: self.locals.max_locals(),
            bytes: self.bytes,
            handlers,
        })
    }
}
