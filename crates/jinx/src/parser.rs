//! The parser and bytecode emitter.
//!
//! A predictive recursive-descent parser over the lexer's symbol stream,
//! emitting bytecode as it goes. Forward jumps are emitted as placeholders
//! and backfilled once the target address is known.
//!
//! The defining complication of the grammar is that whitespace separates
//! words, not constructs: `counter to finished` may be a function call, a
//! multi-word variable, or a property reference depending on what is in
//! scope. Before parsing any primary, the parser therefore collects the
//! upcoming symbols into a part list and checks it against every visible
//! function signature (local table first, then the current, default, and
//! imported libraries); only when no signature matches does it fall back to
//! variables, properties, and literals.

use ahash::{AHashMap, AHashSet};

use crate::bytecode::{
    BYTECODE_SIGNATURE, BYTECODE_VERSION, BinaryWriter, Bytecode, BytecodeHeader, DEBUG_SIGNATURE,
    DebugLineEntry, Opcode,
};
use crate::error::CompileError;
use crate::hash::get_hash;
use crate::lexer::{Symbol, SymbolKind};
use crate::library::{LibraryRef, PropertyName};
use crate::logging::LogLevel;
use crate::runtime::{Runtime, RuntimeId};
use crate::signature::{
    CallPart, FunctionSignature, FunctionTable, SignaturePart, SignaturePartKind, VisibilityType,
};
use crate::variant::{ValueType, Variant};

/// Variable scopes of one execution frame (the script body or one function
/// body).
#[derive(Debug, Default)]
struct FrameData {
    /// Innermost scope last. Names are folded.
    scopes: Vec<AHashSet<String>>,
    /// Longest registered variable name in parts, bounding multi-word
    /// lookahead.
    max_parts: usize,
}

/// A loop being parsed: pending break jumps and the scope depth to unwind to.
#[derive(Debug, Default)]
struct LoopContext {
    break_placeholders: Vec<usize>,
    base_scope_depth: usize,
}

/// Outcome of resolving symbols against the visible property tables.
struct PropertyResolution {
    property: PropertyName,
    /// Symbols consumed, including any library-name prefix.
    consumed: usize,
    /// Deferred diagnostic; raised only when the property is actually used.
    error: Option<&'static str>,
}

pub(crate) struct Parser<'a> {
    runtime: &'a Runtime,
    script_name: String,
    symbols: &'a [Symbol],
    pos: usize,
    error: Option<CompileError>,
    writer: BinaryWriter,
    library: LibraryRef,
    local_functions: FunctionTable,
    import_list: Vec<String>,
    variable_frames: Vec<FrameData>,
    loops: Vec<LoopContext>,
    require_return_value: bool,
    returned_value: bool,
    debug_lines: Vec<DebugLineEntry>,
    last_debug_line: u32,
    /// Names for ids, kept for the bytecode disassembler.
    id_names: AHashMap<RuntimeId, String>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        script_name: &str,
        symbols: &'a [Symbol],
        imports: &[&str],
    ) -> Self {
        let mut import_list: Vec<String> = Vec::new();
        for import in imports {
            if !import_list.iter().any(|i| i == import) {
                import_list.push((*import).to_owned());
            }
        }
        Self {
            runtime,
            script_name: script_name.to_owned(),
            symbols,
            pos: 0,
            error: None,
            writer: BinaryWriter::new(),
            library: runtime.get_library(""),
            local_functions: FunctionTable::default(),
            import_list,
            variable_frames: vec![FrameData {
                scopes: vec![AHashSet::new()],
                max_parts: 0,
            }],
            loops: Vec::new(),
            require_return_value: false,
            returned_value: false,
            debug_lines: Vec::new(),
            last_debug_line: 0,
            id_names: AHashMap::new(),
        }
    }

    /// Compiles the symbol stream to bytecode.
    pub(crate) fn execute(
        mut self,
    ) -> Result<(Bytecode, AHashMap<RuntimeId, String>), CompileError> {
        let header = BytecodeHeader {
            signature: BYTECODE_SIGNATURE,
            version: BYTECODE_VERSION,
            data_size: 0,
        };
        header.write(&mut self.writer);

        self.parse_script();

        if let Some(error) = self.error {
            return Err(error);
        }

        // Backfill the header's data size now that the code stream is
        // complete, then append the debug section.
        let data_size = self.writer.tell();
        self.writer.seek(8);
        self.writer.write_u32(data_size as u32);
        self.writer.seek(data_size);
        if self.runtime.enable_debug_info() {
            self.write_debug_section();
        }
        Ok((self.writer.into_bytecode(), self.id_names))
    }

    fn write_debug_section(&mut self) {
        let start = self.writer.tell();
        self.writer.write_u32(DEBUG_SIGNATURE);
        self.writer.write_u32(self.debug_lines.len() as u32);
        let size_slot = self.writer.tell();
        self.writer.write_u32(0);
        self.writer.write_str(&self.script_name);
        for entry in &self.debug_lines {
            self.writer.write_u32(entry.opcode_position);
            self.writer.write_u32(entry.line_number);
        }
        let end = self.writer.tell();
        self.writer.seek(size_slot);
        self.writer.write_u32((end - start) as u32);
        self.writer.seek(end);
    }

    // =================================================================
    // Diagnostics
    // =================================================================

    fn has_error(&self) -> bool {
        self.error.is_some()
    }

    fn report(&mut self, message: impl Into<String>) {
        if self.error.is_some() {
            return;
        }
        let (line, column) = match self.symbols.get(self.pos) {
            Some(symbol) => (symbol.line, symbol.column),
            None => (
                self.symbols.last().map_or(1, |s| s.line),
                self.symbols.last().map_or(1, |s| s.column),
            ),
        };
        self.error = Some(CompileError::new(&self.script_name, line, column, message));
    }

    // =================================================================
    // Symbol navigation
    // =================================================================

    fn current(&self) -> Option<&Symbol> {
        if self.has_error() {
            return None;
        }
        self.symbols.get(self.pos)
    }

    fn current_kind(&self) -> Option<SymbolKind> {
        self.current().map(|s| s.kind)
    }

    fn next_symbol(&mut self) {
        self.pos += 1;
    }

    /// True when the symbol at `pos` exists and is not a line break.
    fn symbol_valid(&self, pos: usize) -> bool {
        !self.has_error()
            && self
                .symbols
                .get(pos)
                .is_some_and(|s| s.kind != SymbolKind::NewLine)
    }

    fn check(&self, kind: SymbolKind) -> bool {
        self.current_kind() == Some(kind)
    }

    fn accept(&mut self, kind: SymbolKind) -> bool {
        if self.check(kind) {
            self.next_symbol();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: SymbolKind) -> bool {
        if self.accept(kind) {
            return true;
        }
        self.report(format!("Expected symbol {}", kind.text()));
        false
    }

    fn symbol_text_at(&self, pos: usize) -> Option<&str> {
        self.symbols.get(pos).and_then(Symbol::text)
    }

    /// Joins the texts of `count` symbols starting at `pos` with single
    /// spaces. All symbols must be names or keywords.
    fn join_symbols(&self, pos: usize, count: usize) -> Option<String> {
        let mut name = String::new();
        for i in 0..count {
            if !self.symbol_valid(pos + i) {
                return None;
            }
            let text = self.symbol_text_at(pos + i)?;
            if !name.is_empty() {
                name.push(' ');
            }
            name.push_str(text);
        }
        Some(name)
    }

    // =================================================================
    // Variable frames and scopes
    // =================================================================

    fn frame(&self) -> &FrameData {
        self.variable_frames.last().expect("frame stack never empty")
    }

    fn frame_mut(&mut self) -> &mut FrameData {
        self.variable_frames
            .last_mut()
            .expect("frame stack never empty")
    }

    fn variable_assign(&mut self, name: &str) {
        let frame = self.frame_mut();
        for scope in frame.scopes.iter().rev() {
            if scope.contains(name) {
                return;
            }
        }
        let parts = name.split(' ').count();
        if parts > frame.max_parts {
            frame.max_parts = parts;
        }
        if let Some(scope) = frame.scopes.last_mut() {
            scope.insert(name.to_owned());
        }
    }

    fn variable_exists(&self, name: &str) -> bool {
        self.frame().scopes.iter().rev().any(|s| s.contains(name))
    }

    fn frame_begin(&mut self) {
        self.variable_frames.push(FrameData {
            scopes: vec![AHashSet::new()],
            max_parts: 0,
        });
    }

    fn frame_end(&mut self) {
        self.variable_frames.pop();
    }

    fn scope_begin(&mut self) {
        self.frame_mut().scopes.push(AHashSet::new());
        self.emit_opcode(Opcode::ScopeBegin);
    }

    fn scope_end(&mut self) {
        let frame = self.frame_mut();
        frame.scopes.pop();
        // Recompute the lookahead bound now that names went out of scope.
        frame.max_parts = frame
            .scopes
            .iter()
            .flatten()
            .map(|n| n.split(' ').count())
            .max()
            .unwrap_or(0);
        self.emit_opcode(Opcode::ScopeEnd);
    }

    fn scope_depth(&self) -> usize {
        self.frame().scopes.len()
    }

    fn is_root_scope(&self) -> bool {
        self.scope_depth() == 1
    }

    fn is_root_frame(&self) -> bool {
        self.variable_frames.len() == 1
    }

    // =================================================================
    // Emitters
    // =================================================================

    fn emit_opcode(&mut self, opcode: Opcode) {
        self.writer.write_u8(opcode.to_byte());
    }

    fn emit_id(&mut self, id: RuntimeId) {
        self.writer.write_u64(id);
    }

    fn emit_count(&mut self, count: u32) {
        self.writer.write_u32(count);
    }

    fn emit_address(&mut self, address: usize) {
        self.writer.write_u32(address as u32);
    }

    fn emit_address_placeholder(&mut self) -> usize {
        let offset = self.writer.tell();
        self.writer.write_u32(0);
        offset
    }

    /// Writes the current position into a previously reserved jump slot.
    fn backfill_address(&mut self, slot: usize) {
        let current = self.writer.tell();
        self.writer.seek(slot);
        self.writer.write_u32(current as u32);
        self.writer.seek(current);
    }

    fn emit_value(&mut self, value: &Variant) {
        value.write(&mut self.writer);
    }

    fn emit_value_type(&mut self, value_type: ValueType) {
        self.writer.write_u8(value_type.to_byte());
    }

    fn variable_id(&mut self, name: &str) -> RuntimeId {
        let id = get_hash(name.as_bytes());
        self.id_names.insert(id, name.to_owned());
        id
    }

    // =================================================================
    // Name resolution
    // =================================================================

    /// Returns the symbol's text when it names the current library or an
    /// import.
    fn library_name_at(&self, pos: usize) -> Option<String> {
        let text = self.symbol_text_at(pos)?;
        if !self.library.name().is_empty() && text == self.library.name() {
            return Some(text.to_owned());
        }
        if self.import_list.iter().any(|i| i == text) {
            return Some(text.to_owned());
        }
        None
    }

    /// Longest multi-word variable match starting at `pos`; returns the
    /// number of symbols it spans.
    fn check_variable_at(&self, pos: usize) -> Option<usize> {
        let max_parts = self.frame().max_parts;
        for count in (1..=max_parts).rev() {
            if let Some(name) = self.join_symbols(pos, count)
                && self.variable_exists(&name)
            {
                return Some(count);
            }
        }
        None
    }

    fn find_property_in(
        &self,
        library: &LibraryRef,
        pos: usize,
    ) -> Option<(PropertyName, usize)> {
        let max_parts = library.max_property_parts();
        for count in (1..=max_parts).rev() {
            if let Some(name) = self.join_symbols(pos, count)
                && library.property_name_exists(&name)
            {
                return Some((library.get_property_name(&name), count));
            }
        }
        None
    }

    /// Resolves a (possibly library-prefixed, possibly multi-word) property
    /// reference at `pos` without consuming symbols.
    fn resolve_property(&self, pos: usize) -> Option<PropertyResolution> {
        self.symbol_text_at(pos)?;

        // Explicit library prefix scopes the search to that library.
        if let Some(library_name) = self.library_name_at(pos) {
            let library = self.runtime.get_library(&library_name);
            let (property, count) = self.find_property_in(&library, pos + 1)?;
            let error = if library.name() != self.library.name()
                && property.visibility() != VisibilityType::Public
            {
                Some("Unable to access private property")
            } else {
                None
            };
            return Some(PropertyResolution {
                property,
                consumed: count + 1,
                error,
            });
        }

        // The current library wins over imports.
        if let Some((property, count)) = self.find_property_in(&self.library, pos) {
            return Some(PropertyResolution {
                property,
                consumed: count,
                error: None,
            });
        }

        // Otherwise search imports; only public properties are visible, and
        // two visible matches are ambiguous.
        let mut found: Option<(PropertyName, usize)> = None;
        let mut ambiguous = false;
        for import in &self.import_list {
            if !self.runtime.library_exists(import) {
                continue;
            }
            let library = self.runtime.get_library(import);
            if let Some((property, count)) = self.find_property_in(&library, pos) {
                if property.visibility() != VisibilityType::Public {
                    continue;
                }
                if found.is_some() {
                    ambiguous = true;
                    break;
                }
                found = Some((property, count));
            }
        }
        let (property, consumed) = found?;
        Some(PropertyResolution {
            property,
            consumed,
            error: ambiguous.then_some("Ambiguous property name found"),
        })
    }

    fn check_property(&self) -> bool {
        self.resolve_property(self.pos).is_some()
    }

    /// Consumes and returns a resolved property name, raising any deferred
    /// resolution error.
    fn parse_property_name(&mut self) -> PropertyName {
        let Some(resolution) = self.resolve_property(self.pos) else {
            self.report("Could not find property name");
            return PropertyName::invalid();
        };
        if let Some(message) = resolution.error {
            self.report(message);
            return PropertyName::invalid();
        }
        self.pos += resolution.consumed;
        self.id_names.insert(
            resolution.property.id(),
            resolution.property.name().to_owned(),
        );
        resolution.property
    }

    // =================================================================
    // Function-call detection
    // =================================================================

    /// Collects upcoming symbols into call parts for signature matching.
    fn collect_call_parts(&mut self, mut pos: usize) -> Option<Vec<CallPart>> {
        let mut parts = Vec::new();
        while self.symbol_valid(pos) {
            let kind = self.symbols[pos].kind;
            if kind == SymbolKind::Function {
                match self.measure_function_reference(pos) {
                    Some((_, consumed)) => {
                        parts.push(CallPart::Parameter);
                        pos += consumed;
                        continue;
                    }
                    None => break,
                }
            }
            if self.symbol_text_at(pos).is_some() {
                if let Some(resolution) = self.resolve_property(pos) {
                    parts.push(CallPart::NamedParameter(
                        resolution.property.name().to_owned(),
                    ));
                    pos += resolution.consumed;
                } else if let Some(count) = self.check_variable_at(pos) {
                    let name = self.join_symbols(pos, count)?;
                    parts.push(CallPart::NamedParameter(name));
                    pos += count;
                } else {
                    parts.push(CallPart::Name(self.symbol_text_at(pos)?.to_owned()));
                    pos += 1;
                }
                continue;
            }
            if kind.is_constant() {
                parts.push(CallPart::Parameter);
                pos += 1;
                continue;
            }
            if kind == SymbolKind::ParenOpen {
                pos = self.skip_balanced(pos, SymbolKind::ParenOpen, SymbolKind::ParenClose)?;
                parts.push(CallPart::Parameter);
                continue;
            }
            if kind == SymbolKind::SquareOpen {
                pos = self.skip_balanced(pos, SymbolKind::SquareOpen, SymbolKind::SquareClose)?;
                parts.push(CallPart::Parameter);
                continue;
            }
            break;
        }
        if parts.is_empty() { None } else { Some(parts) }
    }

    /// Skips a balanced group, returning the position after the closer.
    fn skip_balanced(&self, mut pos: usize, open: SymbolKind, close: SymbolKind) -> Option<usize> {
        let mut depth = 0;
        loop {
            if !self.symbol_valid(pos) {
                return None;
            }
            let kind = self.symbols[pos].kind;
            if kind == open {
                depth += 1;
            } else if kind == close {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
            pos += 1;
        }
    }

    /// Searches the visible tables for the best signature matching the call
    /// parts: local table, current library, default library, then imports
    /// (where an ambiguous match is a hard error and private functions of
    /// other libraries are invisible).
    fn find_call_signature(
        &mut self,
        parts: &[CallPart],
        explicit_library: Option<&str>,
    ) -> Option<FunctionSignature> {
        if parts.is_empty() {
            return None;
        }
        if let Some(library_name) = explicit_library {
            return self
                .runtime
                .get_library(library_name)
                .find_function_signature(parts);
        }
        if let Some(signature) = self.local_functions.find(parts) {
            return Some(signature.clone());
        }
        if let Some(signature) = self.library.find_function_signature(parts) {
            return Some(signature);
        }
        if !self.library.name().is_empty()
            && let Some(signature) = self
                .runtime
                .get_library("")
                .find_function_signature(parts)
        {
            return Some(signature);
        }
        let mut found: Option<FunctionSignature> = None;
        for import in self.import_list.clone() {
            if import == self.library.name() {
                continue;
            }
            if !self.runtime.library_exists(&import) {
                self.runtime.log(
                    LogLevel::Warning,
                    &format!("Warning: Unable to find library '{import}'"),
                );
                continue;
            }
            let library = self.runtime.get_library(&import);
            if let Some(signature) = library.find_function_signature(parts) {
                if signature.visibility() == VisibilityType::Private {
                    continue;
                }
                if found.is_some() {
                    self.report(
                        "Ambiguous function name detected. Use a library name to disambiguate",
                    );
                    return None;
                }
                found = Some(signature);
            }
        }
        found
    }

    /// Checks whether a function call begins at the current position. The
    /// parser state is not advanced.
    fn check_function_call(&mut self) -> Option<FunctionSignature> {
        if !self.symbol_valid(self.pos) {
            return None;
        }
        let kind = self.symbols[self.pos].kind;
        if kind.is_operator() && kind != SymbolKind::ParenOpen {
            return None;
        }
        let mut pos = self.pos;
        let explicit = self.library_name_at(pos);
        if explicit.is_some() {
            pos += 1;
            if !self.symbol_valid(pos) {
                return None;
            }
        }
        let parts = self.collect_call_parts(pos)?;
        self.find_call_signature(&parts, explicit.as_deref())
    }

    /// Measures a `function <signature>` reference starting at `pos` (the
    /// `function` keyword), returning the target id and symbols consumed.
    fn measure_function_reference(&mut self, pos: usize) -> Option<(RuntimeId, usize)> {
        let mut parts = Vec::new();
        let mut symbol_counts = Vec::new();
        let mut cursor = pos + 1;
        while self.symbol_valid(cursor) {
            if let Some(text) = self.symbol_text_at(cursor) {
                parts.push(CallPart::Name(text.to_owned()));
                symbol_counts.push(1);
                cursor += 1;
            } else if self.symbols[cursor].kind == SymbolKind::CurlyOpen
                && self.symbol_valid(cursor + 1)
                && self.symbols[cursor + 1].kind == SymbolKind::CurlyClose
            {
                parts.push(CallPart::Parameter);
                symbol_counts.push(2);
                cursor += 2;
            } else {
                break;
            }
        }
        let signature = self.find_call_signature(&parts, None)?;
        let matched = signature.matches_prefix(&parts)?;
        let consumed: usize = 1 + symbol_counts[..matched].iter().sum::<usize>();
        Some((signature.id(), consumed))
    }

    /// Parses a function reference expression, pushing the function's id.
    fn parse_function_reference(&mut self) {
        let Some((id, consumed)) = self.measure_function_reference(self.pos) else {
            self.report("Could not find function matching signature reference");
            return;
        };
        self.pos += consumed;
        self.emit_opcode(Opcode::PushVal);
        self.emit_value(&Variant::Integer(id as i64));
    }

    /// Parses a call to `signature`, consuming its name parts and compiling
    /// its parameter expressions, then emits the call.
    fn parse_function_call(&mut self, signature: &FunctionSignature) {
        // Skip an explicit library-name prefix, unless the signature's first
        // part happens to be that very word.
        if let Some(library_name) = self.library_name_at(self.pos)
            && library_name == signature.library()
        {
            let first_matches = signature
                .parts()
                .first()
                .is_some_and(|p| p.names.iter().any(|n| *n == library_name));
            if !first_matches {
                self.next_symbol();
            }
        }

        for (index, part) in signature.parts().iter().enumerate() {
            match part.kind {
                SignaturePartKind::Name => {
                    let matched = self
                        .current()
                        .and_then(Symbol::text)
                        .is_some_and(|text| part.names.iter().any(|n| n == text));
                    if matched {
                        self.next_symbol();
                    } else if !part.optional {
                        self.report("Mismatch in function name");
                        return;
                    }
                }
                SignaturePartKind::Parameter => {
                    if self.check(SymbolKind::Function) {
                        self.parse_function_reference();
                    } else {
                        self.parse_expression_impl(index == 0);
                    }
                }
            }
            if self.has_error() {
                return;
            }
        }
        self.emit_opcode(Opcode::CallFunc);
        self.emit_id(signature.id());
        self.id_names
            .insert(signature.id(), signature.display_name());
    }

    // =================================================================
    // Expressions
    // =================================================================

    fn parse_expression(&mut self) {
        self.parse_expression_impl(false);
    }

    /// Parses a full expression, including collection and list literals.
    ///
    /// `suppress_function_call` blocks function matching for the first
    /// operand only; it is set when parsing the leading parameter of a call
    /// that itself begins with a parameter, which would otherwise recurse
    /// forever.
    fn parse_expression_impl(&mut self, suppress_function_call: bool) {
        if self.has_error() {
            return;
        }
        if self.accept(SymbolKind::SquareOpen) {
            if self.accept(SymbolKind::SquareClose) {
                // Empty collection literal.
                self.emit_opcode(Opcode::PushColl);
                self.emit_count(0);
                return;
            }
            // One or more [key, value] pairs.
            self.parse_subexpression(suppress_function_call);
            if !self.expect(SymbolKind::Comma) {
                return;
            }
            self.parse_subexpression(false);
            self.expect(SymbolKind::SquareClose);
            let mut count = 1u32;
            while self.accept(SymbolKind::Comma) {
                self.expect(SymbolKind::SquareOpen);
                self.parse_subexpression(false);
                self.expect(SymbolKind::Comma);
                self.parse_subexpression(false);
                self.expect(SymbolKind::SquareClose);
                count += 1;
            }
            self.emit_opcode(Opcode::PushColl);
            self.emit_count(count);
            return;
        }

        self.parse_subexpression(suppress_function_call);

        // A comma after the first subexpression makes this a 1-indexed list.
        if self.accept(SymbolKind::Comma) {
            if self.check(SymbolKind::NewLine) {
                self.report("Unexpected end of line in list");
                return;
            }
            let mut count = 1u32;
            loop {
                self.parse_subexpression(false);
                count += 1;
                if !self.accept(SymbolKind::Comma) {
                    break;
                }
            }
            self.emit_opcode(Opcode::PushList);
            self.emit_count(count);
        }
    }

    /// A comma-free expression (one list element, one subscript, etc.).
    fn parse_subexpression(&mut self, suppress_function_call: bool) {
        self.parse_or_expression(suppress_function_call);
    }

    fn parse_or_expression(&mut self, suppress_function_call: bool) {
        self.parse_and_expression(suppress_function_call);
        while self.accept(SymbolKind::Or) {
            // Short circuit: when the left side is already true, skip the
            // right side and leave the left value as the result.
            self.emit_opcode(Opcode::JumpTrueCheck);
            let skip = self.emit_address_placeholder();
            self.parse_and_expression(false);
            self.emit_opcode(Opcode::Or);
            self.backfill_address(skip);
        }
    }

    fn parse_and_expression(&mut self, suppress_function_call: bool) {
        self.parse_not_expression(suppress_function_call);
        while self.accept(SymbolKind::And) {
            self.emit_opcode(Opcode::JumpFalseCheck);
            let skip = self.emit_address_placeholder();
            self.parse_not_expression(false);
            self.emit_opcode(Opcode::And);
            self.backfill_address(skip);
        }
    }

    fn parse_not_expression(&mut self, suppress_function_call: bool) {
        if self.accept(SymbolKind::Not) {
            self.parse_not_expression(false);
            self.emit_opcode(Opcode::Not);
        } else {
            self.parse_comparison_expression(suppress_function_call);
        }
    }

    fn parse_comparison_expression(&mut self, suppress_function_call: bool) {
        self.parse_additive_expression(suppress_function_call);
        loop {
            let opcode = match self.current_kind() {
                Some(SymbolKind::Equals) => Opcode::Equals,
                Some(SymbolKind::NotEquals) => Opcode::NotEquals,
                Some(SymbolKind::LessThan) => Opcode::Less,
                Some(SymbolKind::LessThanEquals) => Opcode::LessEq,
                Some(SymbolKind::GreaterThan) => Opcode::Greater,
                Some(SymbolKind::GreaterThanEquals) => Opcode::GreaterEq,
                _ => return,
            };
            self.next_symbol();
            self.parse_additive_expression(false);
            self.emit_opcode(opcode);
        }
    }

    fn parse_additive_expression(&mut self, suppress_function_call: bool) {
        self.parse_multiplicative_expression(suppress_function_call);
        loop {
            let opcode = match self.current_kind() {
                Some(SymbolKind::Plus) => Opcode::Add,
                Some(SymbolKind::Minus) => Opcode::Subtract,
                _ => return,
            };
            self.next_symbol();
            self.parse_multiplicative_expression(false);
            self.emit_opcode(opcode);
        }
    }

    fn parse_multiplicative_expression(&mut self, suppress_function_call: bool) {
        self.parse_unary_expression(suppress_function_call);
        loop {
            let opcode = match self.current_kind() {
                Some(SymbolKind::Asterisk) => Opcode::Multiply,
                Some(SymbolKind::ForwardSlash) => Opcode::Divide,
                Some(SymbolKind::Percent) => Opcode::Mod,
                _ => return,
            };
            self.next_symbol();
            self.parse_unary_expression(false);
            self.emit_opcode(opcode);
        }
    }

    fn parse_unary_expression(&mut self, suppress_function_call: bool) {
        if self.accept(SymbolKind::Minus) {
            self.parse_cast_expression(false);
            self.emit_opcode(Opcode::Negate);
        } else {
            self.parse_cast_expression(suppress_function_call);
        }
    }

    fn parse_cast_expression(&mut self, suppress_function_call: bool) {
        self.parse_operand(suppress_function_call);
        while self.accept(SymbolKind::As) {
            let value_type = self.parse_value_type();
            if self.has_error() {
                return;
            }
            self.emit_opcode(Opcode::Cast);
            self.emit_value_type(value_type);
        }
    }

    /// Subscripts and the `type` postfix after an operand already on the
    /// stack.
    fn parse_postfix(&mut self) {
        while self.check(SymbolKind::SquareOpen) {
            self.parse_subscript();
            self.emit_opcode(Opcode::PushKeyVal);
        }
        if self.accept(SymbolKind::Type) {
            self.emit_opcode(Opcode::Type);
        }
    }

    /// Parses `[expression]`, leaving the key on the stack. Returns true
    /// when a subscript was present.
    fn parse_subscript(&mut self) -> bool {
        if !self.accept(SymbolKind::SquareOpen) {
            return false;
        }
        self.parse_expression();
        self.expect(SymbolKind::SquareClose);
        true
    }

    fn parse_operand(&mut self, suppress_function_call: bool) {
        if self.has_error() {
            return;
        }
        if self.check(SymbolKind::NewLine) || self.current().is_none() {
            self.report("Expected valid expression");
            return;
        }

        // Function calls have precedence over everything else.
        if !suppress_function_call
            && let Some(signature) = self.check_function_call()
        {
            self.parse_function_call(&signature);
            self.parse_postfix();
            return;
        }

        if self.check(SymbolKind::Function) {
            self.parse_function_reference();
            self.parse_postfix();
            return;
        }

        if self.check_property() {
            let property = self.parse_property_name();
            if !property.is_valid() {
                return;
            }
            let subscript = self.parse_subscript();
            self.emit_opcode(if subscript {
                Opcode::PushPropKeyVal
            } else {
                Opcode::PushProp
            });
            self.emit_id(property.id());
            self.parse_postfix();
            return;
        }

        if let Some(count) = self.check_variable_at(self.pos) {
            let Some(name) = self.join_symbols(self.pos, count) else {
                self.report("Invalid variable name");
                return;
            };
            self.pos += count;
            let subscript = self.parse_subscript();
            let id = self.variable_id(&name);
            self.emit_opcode(if subscript {
                Opcode::PushVarKey
            } else {
                Opcode::PushVar
            });
            self.emit_id(id);
            self.parse_postfix();
            return;
        }

        if self.accept(SymbolKind::ParenOpen) {
            self.parse_expression();
            self.expect(SymbolKind::ParenClose);
            self.parse_postfix();
            return;
        }

        if self.check_value() {
            let value = self.parse_value();
            self.emit_opcode(Opcode::PushVal);
            self.emit_value(&value);
            self.parse_postfix();
            return;
        }

        if self.check_value_type() {
            let value_type = self.parse_value_type();
            self.emit_opcode(Opcode::PushVal);
            self.emit_value(&Variant::ValType(value_type));
            return;
        }

        self.report("Unknown symbol in expression");
    }

    fn check_value(&self) -> bool {
        self.current_kind()
            .is_some_and(|k| k.is_constant() || k == SymbolKind::Null)
    }

    fn parse_value(&mut self) -> Variant {
        use crate::lexer::TokenValue;
        let value = self.current().and_then(|symbol| {
            Some(match (&symbol.kind, &symbol.value) {
                (SymbolKind::Null, _) => Variant::Null,
                (_, TokenValue::Number(n)) => Variant::Number(*n),
                (_, TokenValue::Integer(i)) => Variant::Integer(*i),
                (_, TokenValue::Boolean(b)) => Variant::Boolean(*b),
                (_, TokenValue::Str(s)) => Variant::String(s.clone()),
                _ => return None,
            })
        });
        match value {
            Some(value) => {
                self.next_symbol();
                value
            }
            None => {
                self.report("Unknown value");
                Variant::Null
            }
        }
    }

    fn check_value_type(&self) -> bool {
        matches!(
            self.current_kind(),
            Some(
                SymbolKind::Number
                    | SymbolKind::Integer
                    | SymbolKind::Boolean
                    | SymbolKind::String
                    | SymbolKind::Collection
                    | SymbolKind::Guid
                    | SymbolKind::Null
            )
        )
    }

    fn parse_value_type(&mut self) -> ValueType {
        let value_type = match self.current_kind() {
            Some(SymbolKind::Number) => ValueType::Number,
            Some(SymbolKind::Integer) => ValueType::Integer,
            Some(SymbolKind::Boolean) => ValueType::Boolean,
            Some(SymbolKind::String) => ValueType::String,
            Some(SymbolKind::Collection) => ValueType::Collection,
            Some(SymbolKind::Guid) => ValueType::Guid,
            Some(SymbolKind::Null) => ValueType::Null,
            _ => {
                self.report("Expected value type");
                return ValueType::Null;
            }
        };
        self.next_symbol();
        value_type
    }

    // =================================================================
    // Statements
    // =================================================================

    fn parse_script(&mut self) {
        self.parse_library_imports();
        self.parse_library_declaration();
        while self.pos < self.symbols.len() && !self.has_error() {
            self.parse_statement();
        }
        self.emit_opcode(Opcode::Exit);
    }

    fn parse_library_imports(&mut self) {
        while self.accept(SymbolKind::Import) {
            let name = self.parse_name();
            if name.is_empty() {
                self.report("Expected valid name after 'import' keyword");
                return;
            }
            if !self.expect(SymbolKind::NewLine) {
                return;
            }
            if !self.import_list.iter().any(|i| *i == name) {
                self.import_list.push(name);
            }
        }
    }

    fn parse_library_declaration(&mut self) {
        let mut library_name = String::new();
        if self.accept(SymbolKind::Library) {
            library_name = self.parse_name();
            if library_name.is_empty() {
                self.report("Expected valid name after 'library' keyword");
                return;
            }
            if !self.expect(SymbolKind::NewLine) {
                return;
            }
        }
        self.emit_opcode(Opcode::Library);
        self.writer.write_str(&library_name);
        self.library = self.runtime.get_library(&library_name);
    }

    fn parse_name(&mut self) -> String {
        let name = match self.current() {
            Some(symbol) if symbol.kind == SymbolKind::NameValue => {
                symbol.text().map(str::to_owned)
            }
            _ => None,
        };
        match name {
            Some(name) => {
                self.next_symbol();
                name
            }
            None => {
                self.report("Unexpected symbol type when parsing name");
                String::new()
            }
        }
    }

    /// Gathers name and keyword symbols into a multi-word identifier,
    /// stopping at `stops`, a line break, or any non-name symbol.
    fn parse_multi_name(&mut self, stops: &[SymbolKind]) -> String {
        let mut name = String::new();
        while let Some(symbol) = self.current() {
            if symbol.kind == SymbolKind::NewLine || stops.contains(&symbol.kind) {
                break;
            }
            let Some(text) = symbol.text() else {
                break;
            };
            if !name.is_empty() {
                name.push(' ');
            }
            name.push_str(text);
            self.next_symbol();
        }
        name
    }

    /// Accepts any run of `readonly`, `private`, and `public` keywords.
    fn parse_modifiers(&mut self, read_only: &mut bool, scope: &mut VisibilityType) {
        loop {
            if self.accept(SymbolKind::Readonly) {
                *read_only = true;
            } else if self.accept(SymbolKind::Private) {
                *scope = VisibilityType::Private;
            } else if self.accept(SymbolKind::Public) {
                *scope = VisibilityType::Public;
            } else {
                return;
            }
        }
    }

    fn parse_statement(&mut self) {
        if self.has_error() {
            return;
        }
        let Some(line) = self.current().map(|s| s.line) else {
            self.report("Unexpected end of script");
            return;
        };

        // Record a debug line entry at each new source line.
        if self.runtime.enable_debug_info() && line != self.last_debug_line {
            self.last_debug_line = line;
            self.debug_lines.push(DebugLineEntry {
                opcode_position: self.writer.tell() as u32,
                line_number: line,
            });
        }

        // Function signatures have precedence over everything else.
        if let Some(signature) = self.check_function_call() {
            self.parse_function_call(&signature);
            // Calls always leave their return value; discard it in
            // statement position.
            self.emit_opcode(Opcode::Pop);
            self.expect(SymbolKind::NewLine);
            return;
        }

        let mut read_only = false;
        let mut scope = VisibilityType::Local;
        self.parse_modifiers(&mut read_only, &mut scope);

        if self.accept(SymbolKind::Set) {
            // `set readonly private name to ...`: the modifiers follow the
            // set keyword.
            self.parse_modifiers(&mut read_only, &mut scope);
            if scope == VisibilityType::Local {
                if read_only {
                    self.report("The 'readonly' keyword requires a private or public property");
                    return;
                }
                self.parse_assignment(SymbolKind::To);
            } else {
                self.parse_property_declaration(read_only, scope);
            }
            return;
        }

        if self.accept(SymbolKind::Function) {
            if read_only {
                self.report("The 'readonly' keyword cannot apply to a function");
                return;
            }
            self.parse_function_definition(scope);
            return;
        }

        if read_only || scope != VisibilityType::Local {
            self.report("Expected 'set' or 'function' after scope specifier");
            return;
        }

        match self.current_kind() {
            Some(SymbolKind::Begin) => {
                self.next_symbol();
                self.expect(SymbolKind::NewLine);
                self.parse_block();
                self.expect(SymbolKind::End);
                self.expect(SymbolKind::NewLine);
            }
            Some(SymbolKind::If) => {
                self.next_symbol();
                self.parse_if_else();
            }
            Some(SymbolKind::Loop) => {
                self.next_symbol();
                self.parse_loop();
            }
            Some(SymbolKind::Increment) => {
                self.next_symbol();
                self.parse_increment_decrement(true);
            }
            Some(SymbolKind::Decrement) => {
                self.next_symbol();
                self.parse_increment_decrement(false);
            }
            Some(SymbolKind::Return) => {
                self.next_symbol();
                self.parse_return();
            }
            Some(SymbolKind::Break) => {
                self.next_symbol();
                self.parse_break();
            }
            Some(SymbolKind::Wait) => {
                self.next_symbol();
                self.parse_wait();
            }
            Some(SymbolKind::External) => {
                self.next_symbol();
                self.parse_external();
            }
            Some(SymbolKind::Erase) => {
                self.next_symbol();
                self.parse_erase();
            }
            Some(SymbolKind::Library) => {
                self.report("Library must be declared before any other statement");
            }
            Some(SymbolKind::Import) => {
                self.report("Imports must precede all other statements");
            }
            Some(SymbolKind::NameValue) => {
                // Legacy assignment form: <name> is <expression>
                self.parse_assignment(SymbolKind::Is);
            }
            _ => self.report("Unknown symbol in statement"),
        }
    }

    /// Parses `<lhs> to/is <expression>` where lhs is a property or a
    /// (possibly new) variable, with an optional subscript.
    fn parse_assignment(&mut self, assign_symbol: SymbolKind) {
        if self.check_property() {
            let property = self.parse_property_name();
            if !property.is_valid() {
                return;
            }
            if property.is_read_only() {
                self.report("Cannot assign to a readonly property");
                return;
            }
            let subscript = self.parse_subscript();
            if !self.expect(assign_symbol) {
                return;
            }
            self.parse_expression();
            self.expect(SymbolKind::NewLine);
            self.emit_opcode(if subscript {
                Opcode::SetPropKeyVal
            } else {
                Opcode::SetProp
            });
            self.emit_id(property.id());
            return;
        }

        let name = self.parse_multi_name(&[assign_symbol, SymbolKind::SquareOpen]);
        if name.is_empty() {
            self.report("Expected a variable or property name in assignment");
            return;
        }
        if !self.library.name().is_empty() && name == self.library.name() {
            self.report("Illegal use of library name in identifier");
            return;
        }
        let subscript = self.parse_subscript();
        if !self.expect(assign_symbol) {
            return;
        }
        self.parse_expression();
        self.expect(SymbolKind::NewLine);
        let id = self.variable_id(&name);
        self.emit_opcode(if subscript {
            Opcode::SetVarKey
        } else {
            Opcode::SetVar
        });
        self.emit_id(id);
        self.variable_assign(&name);
    }

    fn parse_property_declaration(&mut self, read_only: bool, scope: VisibilityType) {
        // An explicit library prefix declares into that library.
        let mut target_library = self.library.clone();
        if let Some(library_name) = self.library_name_at(self.pos) {
            target_library = self.runtime.get_library(&library_name);
            self.next_symbol();
        }

        if self.check_property() {
            self.report("Property is already defined");
            return;
        }
        let name = self.parse_multi_name(&[SymbolKind::To]);
        if name.is_empty() {
            self.report("Property name expected");
            return;
        }

        let property = PropertyName::new(scope, read_only, target_library.name(), &name, Variant::Null);
        if !target_library.register_property_name(property.clone(), true) {
            self.report("Error registering property name. Possible duplicate");
            return;
        }
        self.id_names.insert(property.id(), name.clone());

        self.emit_opcode(Opcode::Property);
        property.write(&mut self.writer);

        if self.accept(SymbolKind::To) {
            self.parse_expression();
            self.expect(SymbolKind::NewLine);
            self.emit_opcode(Opcode::SetProp);
            self.emit_id(property.id());
        } else if read_only {
            self.report("A readonly property requires an initial value");
        } else {
            self.expect(SymbolKind::NewLine);
        }
    }

    fn parse_increment_decrement(&mut self, increment: bool) {
        let keyword = if increment { "increment" } else { "decrement" };
        if self.check_property() {
            let property = self.parse_property_name();
            if !property.is_valid() {
                return;
            }
            if property.is_read_only() {
                self.report(format!("Cannot {keyword} a readonly property"));
                return;
            }
            self.emit_opcode(Opcode::PushProp);
            self.emit_id(property.id());
            self.parse_increment_amount();
            self.emit_opcode(if increment {
                Opcode::Increment
            } else {
                Opcode::Decrement
            });
            self.emit_opcode(Opcode::SetProp);
            self.emit_id(property.id());
        } else {
            let name = self.parse_multi_name(&[SymbolKind::By]);
            if name.is_empty() {
                self.report(format!(
                    "Expected property or variable name after {keyword} keyword"
                ));
                return;
            }
            let id = self.variable_id(&name);
            self.emit_opcode(Opcode::PushVar);
            self.emit_id(id);
            self.parse_increment_amount();
            self.emit_opcode(if increment {
                Opcode::Increment
            } else {
                Opcode::Decrement
            });
            self.emit_opcode(Opcode::SetVar);
            self.emit_id(id);
            self.variable_assign(&name);
        }
        self.expect(SymbolKind::NewLine);
    }

    fn parse_increment_amount(&mut self) {
        if self.accept(SymbolKind::By) {
            self.parse_expression();
        } else {
            self.emit_opcode(Opcode::PushVal);
            self.emit_value(&Variant::Integer(1));
        }
    }

    fn parse_if_else(&mut self) {
        self.parse_expression();
        self.expect(SymbolKind::NewLine);

        self.emit_opcode(Opcode::JumpFalse);
        let if_jump = self.emit_address_placeholder();

        self.parse_block();
        let returned_in_if = self.returned_value;
        self.returned_value = false;

        if self.accept(SymbolKind::Else) {
            self.emit_opcode(Opcode::Jump);
            let else_jump = self.emit_address_placeholder();
            self.backfill_address(if_jump);

            if self.accept(SymbolKind::NewLine) {
                self.parse_block();
                self.expect(SymbolKind::End);
                self.expect(SymbolKind::NewLine);
                // All paths return only when both branches did.
                self.returned_value = self.returned_value && returned_in_if;
            } else if self.accept(SymbolKind::If) {
                self.parse_if_else();
                self.returned_value = self.returned_value && returned_in_if;
            } else {
                self.report("Unexpected symbol after else");
            }
            self.backfill_address(else_jump);
        } else if self.accept(SymbolKind::End) {
            self.expect(SymbolKind::NewLine);
            self.backfill_address(if_jump);
            // Without an else, the false path skips the block entirely.
            self.returned_value = false;
        } else {
            self.report("Missing block termination after if");
        }
    }

    fn parse_loop(&mut self) {
        // Optional loop variable: plain name words before the loop form.
        let mut name = String::new();
        while self.check(SymbolKind::NameValue) {
            let Some(text) = self.current().and_then(Symbol::text) else {
                break;
            };
            if !name.is_empty() {
                name.push(' ');
            }
            name.push_str(text);
            self.next_symbol();
        }

        if self.accept(SymbolKind::From) {
            self.parse_loop_from(&name);
        } else if self.accept(SymbolKind::Over) {
            self.parse_loop_over(&name);
        } else if self.accept(SymbolKind::While) {
            self.parse_loop_conditional(false, &name);
        } else if self.accept(SymbolKind::Until) {
            self.parse_loop_conditional(true, &name);
        } else if self.accept(SymbolKind::NewLine) {
            self.parse_loop_post_test(&name);
        } else {
            self.report("Unknown syntax after loop keyword");
        }
    }

    fn loop_enter(&mut self) {
        self.loops.push(LoopContext {
            break_placeholders: Vec::new(),
            base_scope_depth: self.scope_depth(),
        });
    }

    /// Ends the innermost loop, backfilling every break jump to the current
    /// position.
    fn loop_exit(&mut self) {
        if let Some(context) = self.loops.pop() {
            for placeholder in context.break_placeholders {
                self.backfill_address(placeholder);
            }
        }
    }

    fn parse_loop_from(&mut self, name: &str) {
        self.loop_enter();
        self.scope_begin();

        // Counter, limit, and step live in stack slots for LoopCount.
        self.parse_expression();
        if !name.is_empty() {
            self.variable_assign(name);
            let id = self.variable_id(name);
            self.emit_opcode(Opcode::SetIndex);
            self.emit_id(id);
            self.writer.write_i32(-1);
            self.emit_value_type(ValueType::Any);
        }
        self.expect(SymbolKind::To);
        self.parse_expression();
        if self.accept(SymbolKind::By) {
            self.parse_expression();
        } else {
            // A null step is inferred from the counter direction.
            self.emit_opcode(Opcode::PushVal);
            self.emit_value(&Variant::Null);
        }
        self.expect(SymbolKind::NewLine);

        let loop_begin = self.writer.tell();
        self.parse_block();
        self.expect(SymbolKind::End);
        self.expect(SymbolKind::NewLine);

        self.emit_opcode(Opcode::LoopCount);
        self.emit_opcode(Opcode::JumpTrue);
        self.emit_address(loop_begin);

        self.scope_end();
        self.loop_exit();
    }

    fn parse_loop_over(&mut self, name: &str) {
        self.loop_enter();
        self.scope_begin();

        self.parse_expression();
        if !self.expect(SymbolKind::NewLine) {
            return;
        }

        // An empty collection skips the loop entirely.
        self.emit_opcode(Opcode::PushTop);
        self.emit_opcode(Opcode::JumpFalse);
        let empty_jump = self.emit_address_placeholder();

        self.emit_opcode(Opcode::PushItr);
        if !name.is_empty() {
            // Bind the name to the iterator's stack slot so the body sees
            // the current position each pass.
            self.variable_assign(name);
            let id = self.variable_id(name);
            self.emit_opcode(Opcode::SetIndex);
            self.emit_id(id);
            self.writer.write_i32(-1);
            self.emit_value_type(ValueType::Any);
        }

        let loop_begin = self.writer.tell();
        self.parse_block();
        self.expect(SymbolKind::End);
        self.expect(SymbolKind::NewLine);

        self.emit_opcode(Opcode::LoopOver);
        self.emit_opcode(Opcode::JumpFalse);
        self.emit_address(loop_begin);

        self.backfill_address(empty_jump);
        self.scope_end();
        self.loop_exit();
    }

    fn parse_loop_conditional(&mut self, until: bool, name: &str) {
        if !name.is_empty() {
            self.report("A while or until loop cannot declare a loop variable");
            return;
        }
        self.loop_enter();

        let loop_begin = self.writer.tell();
        self.parse_expression();
        if !self.expect(SymbolKind::NewLine) {
            return;
        }

        self.emit_opcode(if until {
            Opcode::JumpTrue
        } else {
            Opcode::JumpFalse
        });
        let exit_jump = self.emit_address_placeholder();

        self.parse_block();
        self.expect(SymbolKind::End);
        self.expect(SymbolKind::NewLine);

        self.emit_opcode(Opcode::Jump);
        self.emit_address(loop_begin);
        self.backfill_address(exit_jump);
        self.loop_exit();
    }

    fn parse_loop_post_test(&mut self, name: &str) {
        if !name.is_empty() {
            self.report("A post-test loop cannot declare a loop variable");
            return;
        }
        self.loop_enter();

        let loop_begin = self.writer.tell();
        self.parse_block();

        if self.accept(SymbolKind::While) {
            self.parse_expression();
            self.expect(SymbolKind::NewLine);
            self.emit_opcode(Opcode::JumpTrue);
            self.emit_address(loop_begin);
        } else if self.accept(SymbolKind::Until) {
            self.parse_expression();
            self.expect(SymbolKind::NewLine);
            self.emit_opcode(Opcode::JumpFalse);
            self.emit_address(loop_begin);
        } else {
            self.report("Expected while or until to close the loop");
            return;
        }
        self.loop_exit();
    }

    fn parse_break(&mut self) {
        self.expect(SymbolKind::NewLine);
        let Some(base_depth) = self.loops.last().map(|l| l.base_scope_depth) else {
            self.report("Illegal break outside of a loop");
            return;
        };
        // Unwind every runtime scope opened since the loop started. The
        // parser's own scope tracking is untouched: break doesn't end the
        // lexical scope, only the executed one.
        let unwind = self.scope_depth().saturating_sub(base_depth);
        for _ in 0..unwind {
            self.emit_opcode(Opcode::ScopeEnd);
        }
        self.emit_opcode(Opcode::Jump);
        let placeholder = self.emit_address_placeholder();
        if let Some(context) = self.loops.last_mut() {
            context.break_placeholders.push(placeholder);
        }
    }

    fn parse_return(&mut self) {
        if self.check(SymbolKind::NewLine) {
            if self.require_return_value {
                self.report("Required return value not found");
                return;
            }
            self.emit_opcode(Opcode::PushVal);
            self.emit_value(&Variant::Null);
        } else {
            self.returned_value = true;
            self.parse_expression();
        }
        self.accept(SymbolKind::NewLine);
        self.emit_opcode(Opcode::Return);
    }

    fn parse_wait(&mut self) {
        if self.accept(SymbolKind::NewLine) {
            self.emit_opcode(Opcode::Wait);
            return;
        }
        let until = if self.accept(SymbolKind::Until) {
            true
        } else if self.accept(SymbolKind::While) {
            false
        } else {
            self.report("Unexpected symbol after wait");
            return;
        };

        // Re-evaluate the expression after every wait tick.
        let expression_address = self.writer.tell();
        self.parse_expression();
        if !self.expect(SymbolKind::NewLine) {
            return;
        }
        self.emit_opcode(if until {
            Opcode::JumpTrue
        } else {
            Opcode::JumpFalse
        });
        let exit_jump = self.emit_address_placeholder();
        self.emit_opcode(Opcode::Wait);
        self.emit_opcode(Opcode::Jump);
        self.emit_address(expression_address);
        self.backfill_address(exit_jump);
    }

    fn parse_external(&mut self) {
        if !self.is_root_frame() {
            self.report("External variables can only be declared in the root frame");
            return;
        }
        if !self.is_root_scope() {
            self.report("External variables can only be declared at the root scope");
            return;
        }
        let name = self.parse_multi_name(&[]);
        if name.is_empty() {
            self.report("Expected valid name after 'external' keyword");
            return;
        }
        self.expect(SymbolKind::NewLine);
        // No bytecode: the host seeds the variable before execution.
        self.variable_id(&name);
        self.variable_assign(&name);
    }

    fn parse_erase(&mut self) {
        if self.check_property() {
            let property = self.parse_property_name();
            if !property.is_valid() {
                return;
            }
            if property.is_read_only() {
                self.report("Cannot erase from a readonly property");
                return;
            }
            let subscript = self.parse_subscript();
            self.emit_opcode(if subscript {
                Opcode::ErasePropElem
            } else {
                Opcode::EraseProp
            });
            self.emit_id(property.id());
        } else {
            let name = self.parse_multi_name(&[SymbolKind::SquareOpen]);
            if name.is_empty() {
                self.report("Expected property or variable name after erase keyword");
                return;
            }
            if !self.variable_exists(&name) {
                self.report("Unknown variable name after erase keyword");
                return;
            }
            let subscript = self.parse_subscript();
            let id = self.variable_id(&name);
            self.emit_opcode(if subscript {
                Opcode::EraseVarElem
            } else {
                Opcode::EraseVar
            });
            self.emit_id(id);
        }
        self.expect(SymbolKind::NewLine);
    }

    fn parse_block(&mut self) {
        if self.has_error() {
            return;
        }
        self.scope_begin();
        while !self.has_error() {
            match self.current_kind() {
                None => {
                    self.report("Unexpected end of script in block");
                    break;
                }
                Some(
                    SymbolKind::End | SymbolKind::Else | SymbolKind::While | SymbolKind::Until,
                ) => break,
                _ => self.parse_statement(),
            }
        }
        self.scope_end();
    }

    // =================================================================
    // Function definitions
    // =================================================================

    fn check_function_name_part(&self) -> bool {
        self.current()
            .is_some_and(|s| s.kind == SymbolKind::NameValue || s.kind.is_keyword())
    }

    fn parse_function_name_part(&mut self) -> String {
        let text = self
            .current()
            .and_then(Symbol::text)
            .map(str::to_owned)
            .unwrap_or_default();
        if text.is_empty() {
            self.report("Unexpected symbol type when parsing function name");
        } else {
            self.next_symbol();
        }
        text
    }

    /// Parses alternate names (`a/b/c`) into one signature part.
    fn parse_name_alternates(&mut self) -> smallvec::SmallVec<[String; 1]> {
        let mut names = smallvec::SmallVec::new();
        let first = self.parse_function_name_part();
        if first.is_empty() {
            return names;
        }
        names.push(first);
        while self.accept(SymbolKind::ForwardSlash) {
            if !self.check_function_name_part() {
                self.report("Invalid name in function signature");
                return names;
            }
            let name = self.parse_function_name_part();
            if names.contains(&name) {
                self.report("Duplicate alternative name in function signature");
                return names;
            }
            names.push(name);
        }
        names
    }

    fn parse_function_signature(&mut self, scope: VisibilityType) -> FunctionSignature {
        let returns_value = self.accept(SymbolKind::Return);
        if self.check(SymbolKind::NewLine) {
            self.report("Empty function signature");
            return FunctionSignature::new(scope, returns_value, self.library.name(), Vec::new());
        }

        let mut parts: Vec<SignaturePart> = Vec::new();
        let mut parsed_parameter = false;
        let mut has_name_part = false;
        let mut has_non_keyword_name = false;

        while !self.check(SymbolKind::NewLine) && !self.has_error() {
            if self.accept(SymbolKind::CurlyOpen) {
                if parsed_parameter {
                    self.report(
                        "Functions cannot have multiple parameters without a name between them",
                    );
                    break;
                }
                let value_type = if self.check_value_type() {
                    self.parse_value_type()
                } else {
                    ValueType::Any
                };
                if !self.check(SymbolKind::NameValue) {
                    self.report("No variable name found in function parameter");
                    break;
                }
                let parameter_name = self.parse_name();
                self.expect(SymbolKind::CurlyClose);
                parts.push(SignaturePart::parameter(Some(parameter_name), value_type));
                parsed_parameter = true;
            } else if self.accept(SymbolKind::ParenOpen) {
                if !self.check_function_name_part() {
                    self.report("Invalid name in function signature");
                    break;
                }
                let names = self.parse_name_alternates();
                self.expect(SymbolKind::ParenClose);
                has_name_part = true;
                has_non_keyword_name |= names.iter().any(|n| !crate::lexer::is_keyword_text(n));
                parts.push(SignaturePart::name(names, true));
                parsed_parameter = false;
            } else if self.check_function_name_part() {
                let names = self.parse_name_alternates();
                has_name_part = true;
                has_non_keyword_name |= names.iter().any(|n| !crate::lexer::is_keyword_text(n));
                parts.push(SignaturePart::name(names, false));
                parsed_parameter = false;
            } else {
                self.report("Invalid name in function signature");
                break;
            }
        }
        self.expect(SymbolKind::NewLine);

        if !self.has_error() {
            if !has_name_part {
                self.report("Function signature requires at least one name part");
            } else if !has_non_keyword_name {
                self.report("Function signature cannot consist solely of keywords");
            }
        }

        let signature =
            FunctionSignature::new(scope, returns_value, self.library.name(), parts);
        if !self.has_error() {
            self.emit_opcode(Opcode::Function);
            signature.write(&mut self.writer);
            self.id_names.insert(signature.id(), signature.display_name());
        }
        signature
    }

    fn parse_function_definition(&mut self, scope: VisibilityType) {
        if !self.is_root_frame() {
            self.report("Cannot define a function inside another function");
            return;
        }
        if !self.is_root_scope() {
            self.report("Cannot define a function inside a scoped execution block");
            return;
        }

        let signature = self.parse_function_signature(scope);
        if self.has_error() || !signature.is_valid() {
            if !self.has_error() {
                self.report("Invalid function definition");
            }
            return;
        }

        // Register before parsing the body so recursion resolves.
        if signature.visibility() == VisibilityType::Local {
            if !self.local_functions.register(signature.clone(), true) {
                self.report("Function is already defined in this script");
                return;
            }
        } else if !self
            .library
            .register_function_signature_checked(signature.clone())
        {
            self.report(format!(
                "Function is already defined in library '{}'",
                self.library.name()
            ));
            return;
        }

        // Top-level execution jumps over the body.
        self.emit_opcode(Opcode::Jump);
        let jump_backfill = self.emit_address_placeholder();

        self.frame_begin();

        // Bind parameter names to the arguments already on the stack, in
        // reverse order since they were pushed in call order.
        let parameters: Vec<SignaturePart> = signature.parameters().cloned().collect();
        let mut stack_index = -1i32;
        for part in parameters.iter().rev() {
            let Some(parameter_name) = part.names.first().cloned() else {
                self.report("Function parameter requires a name");
                return;
            };
            self.variable_assign(&parameter_name);
            let id = self.variable_id(&parameter_name);
            self.emit_opcode(Opcode::SetIndex);
            self.emit_id(id);
            self.writer.write_i32(stack_index);
            self.emit_value_type(part.value_type);
            stack_index -= 1;
        }

        let saved_require = self.require_return_value;
        let saved_returned = self.returned_value;
        self.require_return_value = signature.returns_value();
        self.returned_value = false;

        while !self.check(SymbolKind::End) && !self.has_error() {
            if self.current().is_none() {
                self.report("Unexpected end of script in function body");
                break;
            }
            self.parse_statement();
        }
        self.expect(SymbolKind::End);
        self.expect(SymbolKind::NewLine);

        if self.require_return_value && !self.returned_value {
            self.report("Required return value not found");
        }

        // Implicit null return for bodies that fall off the end.
        self.emit_opcode(Opcode::PushVal);
        self.emit_value(&Variant::Null);
        self.emit_opcode(Opcode::Return);

        self.backfill_address(jump_backfill);
        self.frame_end();

        self.require_return_value = saved_require;
        self.returned_value = saved_returned;
    }
}
