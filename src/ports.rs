//! Hierarchical parameter port tree.
//!
//! A [`Ports`] collection is a static, immutable schema mapping `/`-delimited
//! path segments to typed leaf parameters, side-effect callbacks, or nested
//! collections. The schema never references a concrete runtime object;
//! dispatch threads the "current object" down the tree as a `&mut dyn Any`,
//! so one collection definition serves every element of an array port.
//!
//! Dispatch is allocation-free and usable on the audio thread. The
//! enumeration helpers ([`Ports::walk`], [`Ports::search`]) build path
//! strings and belong on the control thread.

use std::any::Any;
use std::fmt::Write as _;

use crate::message::{Arg, MessageView};

/// Destination for replies emitted during dispatch.
///
/// The real-time implementation encodes into a scratch buffer and writes the
/// to-control channel; tests substitute an in-memory recorder.
pub trait ReplySink {
    /// Composes and enqueues a reply. `false` means it was dropped.
    fn reply(&mut self, path: &str, args: &[Arg<'_>]) -> bool;
    /// Enqueues an already-encoded message verbatim.
    fn reply_raw(&mut self, bytes: &[u8]) -> bool;
}

/// Per-dispatch state: the reply capability and the leaf match count.
///
/// Created fresh for each inbound message. The current object is not a field
/// here; it travels as an explicit dispatch argument because each `Tree`
/// recursion reborrows a child out of its parent.
pub struct DispatchCtx<'a> {
    sink: &'a mut dyn ReplySink,
    /// Number of leaves invoked. Zero after dispatch means "no such path".
    pub matches: u32,
}

impl<'a> DispatchCtx<'a> {
    pub fn new(sink: &'a mut dyn ReplySink) -> Self {
        Self { sink, matches: 0 }
    }

    pub fn reply(&mut self, path: &str, args: &[Arg<'_>]) -> bool {
        self.sink.reply(path, args)
    }

    pub fn reply_raw(&mut self, bytes: &[u8]) -> bool {
        self.sink.reply_raw(bytes)
    }
}

pub type DispatchFn = fn(&MessageView, &mut dyn Any, &mut DispatchCtx);
pub type SelectFn = fn(&mut dyn Any, usize) -> Option<&mut dyn Any>;

/// Documentation and machine-readable hints attached to a port.
#[derive(Debug, Clone, Copy)]
pub struct Meta {
    pub doc: &'static str,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub choices: &'static [&'static str],
    pub hidden: bool,
}

impl Meta {
    pub const fn doc(doc: &'static str) -> Self {
        Self {
            doc,
            min: None,
            max: None,
            choices: &[],
            hidden: false,
        }
    }

    /// Declares the numeric domain `[min, max]`.
    pub const fn range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Declares enumerated value names, index-ordered.
    pub const fn options(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    /// Excludes the port from introspection listings.
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn clamp_f(&self, v: f32) -> f32 {
        match (self.min, self.max) {
            (Some(min), Some(max)) => v.clamp(min, max),
            _ => v,
        }
    }

    fn clamp_i(&self, v: i32) -> i32 {
        match (self.min, self.max) {
            (Some(min), Some(max)) => v.clamp(min as i32, max as i32),
            _ => v,
        }
    }

    /// Writes the human-readable metadata line: doc text, numeric domain,
    /// choice names. Works against any `fmt::Write`, so the audio thread can
    /// target a [`MetaText`] and the control thread a `String`.
    pub fn render_to(&self, out: &mut dyn std::fmt::Write) {
        let _ = out.write_str(self.doc);
        if let (Some(min), Some(max)) = (self.min, self.max) {
            let _ = write!(out, " [{min}..{max}]");
        }
        if !self.choices.is_empty() {
            let _ = out.write_str(" {");
            for (i, choice) in self.choices.iter().enumerate() {
                if i > 0 {
                    let _ = out.write_str(", ");
                }
                let _ = out.write_str(choice);
            }
            let _ = out.write_char('}');
        }
    }

    /// Renders the metadata as the text blob sent in `/paths` replies.
    /// Allocates; control-thread only.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }
}

/// Fixed-capacity text scratch so port metadata can be rendered without
/// allocating. Text past the capacity is dropped at a char boundary.
pub struct MetaText {
    buf: [u8; 256],
    len: usize,
}

impl MetaText {
    pub fn new() -> Self {
        Self {
            buf: [0; 256],
            len: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        // Only whole `str` fragments land in `buf`.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl Default for MetaText {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Write for MetaText {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let room = self.buf.len() - self.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            let mut end = room;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            end
        };
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Typed leaf accessor over the current object.
///
/// The getters and setters downcast internally; a type mismatch is a no-op.
/// A message with zero arguments is a query and replies with the current
/// value; one with a matching argument sets the field, clamped to the
/// declared domain.
pub enum Access {
    Float {
        get: fn(&dyn Any) -> Option<f32>,
        set: fn(&mut dyn Any, f32),
    },
    Int {
        get: fn(&dyn Any) -> Option<i32>,
        set: fn(&mut dyn Any, i32),
    },
    Bool {
        get: fn(&dyn Any) -> Option<bool>,
        set: fn(&mut dyn Any, bool),
    },
}

impl Access {
    fn invoke(&self, meta: &Meta, msg: &MessageView, obj: &mut dyn Any, ctx: &mut DispatchCtx) {
        match self {
            Access::Float { get, set } => match msg.arg(0) {
                None => {
                    if let Some(v) = get(obj) {
                        ctx.reply(msg.path(), &[Arg::Float(v)]);
                    }
                }
                Some(Arg::Float(v)) => set(obj, meta.clamp_f(v)),
                Some(_) => {}
            },
            Access::Int { get, set } => match msg.arg(0) {
                None => {
                    if let Some(v) = get(obj) {
                        ctx.reply(msg.path(), &[Arg::Int(v)]);
                    }
                }
                Some(Arg::Int(v)) => set(obj, meta.clamp_i(v)),
                Some(_) => {}
            },
            Access::Bool { get, set } => match msg.arg(0) {
                None => {
                    if let Some(v) = get(obj) {
                        ctx.reply(msg.path(), &[Arg::Bool(v)]);
                    }
                }
                Some(Arg::Bool(v)) => set(obj, v),
                Some(_) => {}
            },
        }
    }
}

/// What a port does when its name matches the head path segment.
pub enum PortKind {
    /// Leaf parameter bound to a field of the current object.
    Param(Access),
    /// Arbitrary side-effect callback.
    Action(DispatchFn),
    /// Nested collection; `select` projects the child object (array index
    /// included) out of the current one.
    Tree {
        ports: &'static Ports,
        select: SelectFn,
    },
}

/// A named, documented node in the parameter tree.
pub struct Port {
    pub name: &'static str,
    /// Range placeholder: `Some(n)` makes the port match `name0 .. name{n-1}`.
    pub count: Option<usize>,
    pub meta: Meta,
    pub kind: PortKind,
}

impl Port {
    pub const fn float(
        name: &'static str,
        meta: Meta,
        get: fn(&dyn Any) -> Option<f32>,
        set: fn(&mut dyn Any, f32),
    ) -> Self {
        Self {
            name,
            count: None,
            meta,
            kind: PortKind::Param(Access::Float { get, set }),
        }
    }

    pub const fn int(
        name: &'static str,
        meta: Meta,
        get: fn(&dyn Any) -> Option<i32>,
        set: fn(&mut dyn Any, i32),
    ) -> Self {
        Self {
            name,
            count: None,
            meta,
            kind: PortKind::Param(Access::Int { get, set }),
        }
    }

    pub const fn boolean(
        name: &'static str,
        meta: Meta,
        get: fn(&dyn Any) -> Option<bool>,
        set: fn(&mut dyn Any, bool),
    ) -> Self {
        Self {
            name,
            count: None,
            meta,
            kind: PortKind::Param(Access::Bool { get, set }),
        }
    }

    pub const fn action(name: &'static str, meta: Meta, f: DispatchFn) -> Self {
        Self {
            name,
            count: None,
            meta,
            kind: PortKind::Action(f),
        }
    }

    pub const fn tree(
        name: &'static str,
        meta: Meta,
        ports: &'static Ports,
        select: SelectFn,
    ) -> Self {
        Self {
            name,
            count: None,
            meta,
            kind: PortKind::Tree { ports, select },
        }
    }

    /// An indexed bank of `count` homogeneous children sharing one schema.
    pub const fn array(
        name: &'static str,
        count: usize,
        meta: Meta,
        ports: &'static Ports,
        select: SelectFn,
    ) -> Self {
        Self {
            name,
            count: Some(count),
            meta,
            kind: PortKind::Tree { ports, select },
        }
    }

    /// Matches a concrete path segment against this port's name, resolving
    /// the array index for range-placeholder ports. Plain ports yield index
    /// zero. Out-of-range or non-numeric suffixes do not match.
    pub fn match_name(&self, segment: &str) -> Option<usize> {
        match self.count {
            None => (segment == self.name).then_some(0),
            Some(n) => {
                let suffix = segment.strip_prefix(self.name)?;
                if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let index: usize = suffix.parse().ok()?;
                (index < n).then_some(index)
            }
        }
    }
}

/// An ordered collection of ports. Ordering matters only for enumeration
/// determinism; dispatch matches by name.
pub struct Ports(pub &'static [Port]);

impl Ports {
    pub fn iter(&self) -> std::slice::Iter<'_, Port> {
        self.0.iter()
    }

    /// Resolves `path` (no leading `/`) against this collection and invokes
    /// the matched leaf with `msg`'s arguments. Unmatched paths terminate
    /// silently; callers inspect `ctx.matches`.
    pub fn dispatch(&self, path: &str, msg: &MessageView, obj: &mut dyn Any, ctx: &mut DispatchCtx) {
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        for port in self.0 {
            let Some(index) = port.match_name(head) else {
                continue;
            };
            match (&port.kind, rest) {
                (PortKind::Param(access), None) => {
                    ctx.matches += 1;
                    access.invoke(&port.meta, msg, obj, ctx);
                    return;
                }
                (PortKind::Action(f), None) => {
                    ctx.matches += 1;
                    f(msg, obj, ctx);
                    return;
                }
                (PortKind::Tree { ports, select }, Some(rest)) => {
                    if let Some(child) = select(obj, index) {
                        ports.dispatch(rest, msg, child, ctx);
                    }
                    return;
                }
                // Path shape mismatch (leaf with a trailing path, or a tree
                // addressed as a leaf): keep scanning, ends unmatched.
                _ => {}
            }
        }
    }

    /// First port anywhere in the tree whose name contains `fragment`,
    /// depth-first in declaration order.
    pub fn apropos(&self, fragment: &str) -> Option<&Port> {
        for port in self.0 {
            if port.name.contains(fragment) {
                return Some(port);
            }
            if let PortKind::Tree { ports, .. } = &port.kind {
                if let Some(found) = ports.apropos(fragment) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Visits every port with its reconstructed full path. Placeholder
    /// segments render as `name#N`. Allocates; control-thread only.
    pub fn walk(&self, f: &mut dyn FnMut(&str, &Port)) {
        let mut prefix = String::new();
        self.walk_inner(&mut prefix, f);
    }

    fn walk_inner(&self, prefix: &mut String, f: &mut dyn FnMut(&str, &Port)) {
        for port in self.0 {
            let mark = prefix.len();
            prefix.push('/');
            prefix.push_str(port.name);
            if let Some(n) = port.count {
                let _ = write!(prefix, "#{n}");
            }
            f(prefix, port);
            if let PortKind::Tree { ports, .. } = &port.kind {
                ports.walk_inner(prefix, f);
            }
            prefix.truncate(mark);
        }
    }

    /// Enumerates every non-hidden port whose name contains `fragment`.
    pub fn search(&self, fragment: &str, f: &mut dyn FnMut(&str, &Port)) {
        self.walk(&mut |path, port| {
            if !port.meta.hidden && port.name.contains(fragment) {
                f(path, port);
            }
        });
    }

    /// Exact segment-wise lookup of a concrete path (leading `/` optional).
    pub fn find(&self, path: &str) -> Option<&Port> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        for port in self.0 {
            if port.match_name(head).is_none() {
                continue;
            }
            return match (&port.kind, rest) {
                (PortKind::Tree { ports, .. }, Some(rest)) => ports.find(rest),
                (_, None) => Some(port),
                _ => None,
            };
        }
        None
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::{encode, TestSink};
    use super::*;
    use crate::message::MessageView;

    // A small fixture hierarchy: a bank holding four cells.
    #[derive(Default)]
    struct Bank {
        level: f32,
        cells: [Cell; 4],
    }

    #[derive(Default)]
    struct Cell {
        value: i32,
    }

    static CELL_PORTS: Ports = Ports(&[Port::int(
        "value",
        Meta::doc("Cell value").range(0.0, 100.0),
        |o| o.downcast_ref::<Cell>().map(|c| c.value),
        |o, v| {
            if let Some(c) = o.downcast_mut::<Cell>() {
                c.value = v;
            }
        },
    )]);

    static BANK_PORTS: Ports = Ports(&[
        Port::float(
            "level",
            Meta::doc("Bank output level").range(0.0, 1.0),
            |o| o.downcast_ref::<Bank>().map(|b| b.level),
            |o, v| {
                if let Some(b) = o.downcast_mut::<Bank>() {
                    b.level = v;
                }
            },
        ),
        Port::array(
            "cell",
            4,
            Meta::doc("Cell bank element"),
            &CELL_PORTS,
            |o, i| {
                o.downcast_mut::<Bank>()
                    .map(|b| &mut b.cells[i] as &mut dyn Any)
            },
        ),
        Port::action("ping", Meta::doc("Reply with pong").hidden(), |_, _, ctx| {
            ctx.reply("/pong", &[]);
        }),
    ]);

    fn dispatch_into(bank: &mut Bank, path: &str, args: &[Arg]) -> (u32, TestSink) {
        let bytes = encode(path, args);
        let msg = MessageView::parse(&bytes).unwrap();
        let mut sink = TestSink::new();
        let mut ctx = DispatchCtx::new(&mut sink);
        BANK_PORTS.dispatch(msg.path().trim_start_matches('/'), &msg, bank, &mut ctx);
        (ctx.matches, sink)
    }

    #[test]
    fn leaf_set_matches_exactly_once() {
        let mut bank = Bank::default();
        let (matches, _) = dispatch_into(&mut bank, "/level", &[Arg::Float(0.7)]);
        assert_eq!(matches, 1);
        assert_eq!(bank.level, 0.7);
    }

    #[test]
    fn unmatched_path_leaves_zero_matches_and_no_mutation() {
        let mut bank = Bank::default();
        let (matches, sink) = dispatch_into(&mut bank, "/nope", &[Arg::Float(0.7)]);
        assert_eq!(matches, 0);
        assert!(sink.sent.is_empty());
        assert_eq!(bank.level, 0.0);
    }

    #[test]
    fn placeholder_resolves_array_index() {
        let mut bank = Bank::default();
        let (matches, _) = dispatch_into(&mut bank, "/cell2/value", &[Arg::Int(42)]);
        assert_eq!(matches, 1);
        assert_eq!(bank.cells[2].value, 42);
        assert_eq!(bank.cells[0].value, 0);
        assert_eq!(bank.cells[1].value, 0);
        assert_eq!(bank.cells[3].value, 0);
    }

    #[test]
    fn placeholder_out_of_range_is_unmatched() {
        let mut bank = Bank::default();
        let (matches, _) = dispatch_into(&mut bank, "/cell4/value", &[Arg::Int(42)]);
        assert_eq!(matches, 0);
        let (matches, _) = dispatch_into(&mut bank, "/cell/value", &[Arg::Int(42)]);
        assert_eq!(matches, 0);
        let (matches, _) = dispatch_into(&mut bank, "/cellx/value", &[Arg::Int(42)]);
        assert_eq!(matches, 0);
    }

    #[test]
    fn query_replies_with_current_value() {
        let mut bank = Bank::default();
        bank.cells[1].value = 9;
        let (matches, sink) = dispatch_into(&mut bank, "/cell1/value", &[]);
        assert_eq!(matches, 1);
        assert_eq!(sink.sent.len(), 1);
        let reply = MessageView::parse(&sink.sent[0]).unwrap();
        assert_eq!(reply.path(), "/cell1/value");
        assert_eq!(reply.arg(0), Some(Arg::Int(9)));
    }

    #[test]
    fn set_clamps_to_declared_domain() {
        let mut bank = Bank::default();
        dispatch_into(&mut bank, "/level", &[Arg::Float(3.5)]);
        assert_eq!(bank.level, 1.0);
        dispatch_into(&mut bank, "/cell0/value", &[Arg::Int(-5)]);
        assert_eq!(bank.cells[0].value, 0);
    }

    #[test]
    fn type_mismatch_counts_but_does_not_mutate() {
        let mut bank = Bank::default();
        let (matches, _) = dispatch_into(&mut bank, "/level", &[Arg::Str("loud")]);
        assert_eq!(matches, 1);
        assert_eq!(bank.level, 0.0);
    }

    #[test]
    fn action_ports_fire() {
        let mut bank = Bank::default();
        let (matches, sink) = dispatch_into(&mut bank, "/ping", &[]);
        assert_eq!(matches, 1);
        assert_eq!(sink.reply_path(0), "/pong");
    }

    #[test]
    fn apropos_scans_depth_first() {
        let port = BANK_PORTS.apropos("val").unwrap();
        assert_eq!(port.name, "value");
        let port = BANK_PORTS.apropos("lev").unwrap();
        assert_eq!(port.name, "level");
        assert!(BANK_PORTS.apropos("missing").is_none());
    }

    #[test]
    fn walk_reconstructs_full_paths() {
        let mut paths = Vec::new();
        BANK_PORTS.walk(&mut |path, _| paths.push(path.to_string()));
        assert_eq!(paths, ["/level", "/cell#4", "/cell#4/value", "/ping"]);
    }

    #[test]
    fn enumeration_is_idempotent() {
        let collect = || {
            let mut paths = Vec::new();
            BANK_PORTS.walk(&mut |path, _| paths.push(path.to_string()));
            paths
        };
        assert_eq!(collect(), collect());
        assert_eq!(collect(), collect());
    }

    #[test]
    fn search_filters_by_name_and_hides_hidden() {
        let mut names = Vec::new();
        BANK_PORTS.search("", &mut |path, _| names.push(path.to_string()));
        assert!(names.contains(&"/level".to_string()));
        assert!(names.contains(&"/cell#4/value".to_string()));
        // "ping" is hidden.
        assert!(!names.contains(&"/ping".to_string()));

        let mut hits = Vec::new();
        BANK_PORTS.search("val", &mut |path, _| hits.push(path.to_string()));
        assert_eq!(hits, ["/cell#4/value"]);
    }

    #[test]
    fn find_resolves_concrete_paths() {
        assert_eq!(BANK_PORTS.find("/cell3/value").unwrap().name, "value");
        assert_eq!(BANK_PORTS.find("level").unwrap().name, "level");
        assert!(BANK_PORTS.find("/cell9/value").is_none());
        assert!(BANK_PORTS.find("/cell3/other").is_none());
    }

    #[test]
    fn meta_renders_domain_and_options() {
        let meta = Meta::doc("Shape").range(0.0, 2.0).options(&["a", "b", "c"]);
        assert_eq!(meta.render(), "Shape [0..2] {a, b, c}");
    }

    #[test]
    fn meta_text_matches_render_and_caps_length() {
        let meta = Meta::doc("Shape").range(0.0, 2.0).options(&["a", "b", "c"]);
        let mut text = MetaText::new();
        meta.render_to(&mut text);
        assert_eq!(text.as_str(), meta.render());

        let mut text = MetaText::new();
        for _ in 0..100 {
            meta.render_to(&mut text);
        }
        assert_eq!(text.as_str().len(), 256);
        assert!(text.as_str().starts_with("Shape [0..2] {a, b, c}"));
    }
}
