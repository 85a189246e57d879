//! Immutable protocol schema built from spec text.
//!
//! The tree mirrors the structure of the published JDWP spec:
//!
//! ```text
//! Spec
//!  |- CommandSet (VirtualMachine=1, ...)
//!  |   |- Command (Version=1, ...)
//!  |   |   |- request arguments  (the `Out` form)
//!  |   |   |- response arguments (the `Reply` or `Event` form)
//!  |   |   |- declared error names (informational only)
//!  |- ConstantSet (Error, EventKind, Tag, ...)
//!      |- Constant (INVALID_THREAD=10, ...)
//! ```
//!
//! Everything is read-only after construction; the wire codec walks the
//! `Argument` tree to encode requests and decode replies and events.

use std::collections::HashMap;

use crate::sexpr::{self, Sexpr};
use crate::ParseError;

/// A parsed protocol spec. Built once, shared read-only afterwards.
#[derive(Debug)]
pub struct Spec {
    command_sets: HashMap<String, CommandSet>,
    constant_sets: HashMap<String, ConstantSet>,
}

#[derive(Debug)]
pub struct CommandSet {
    name: String,
    id: u8,
    commands: HashMap<String, Command>,
}

#[derive(Debug)]
pub struct Command {
    name: String,
    id: u8,
    command_set_id: u8,
    request: Vec<Argument>,
    response: Vec<Argument>,
    errors: Vec<String>,
}

#[derive(Debug)]
pub struct ConstantSet {
    name: String,
    constants: HashMap<String, Constant>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    pub name: String,
    pub value: ConstantValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Int(i64),
    Char(char),
    Str(String),
}

impl ConstantValue {
    /// Numeric view used when a constant selects an `Alt`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ConstantValue::Int(v) => Some(v),
            ConstantValue::Char(c) => Some(c as i64),
            ConstantValue::Str(_) => None,
        }
    }
}

/// One field of a request, reply, or composite.
///
/// Every traversal in the codec matches exhaustively on this, so adding a
/// variant forces each site to handle it.
#[derive(Debug, PartialEq)]
pub enum Argument {
    /// Fixed-width scalar or negotiated-width identifier, by type name.
    Primitive { type_name: String, name: String },
    /// u32 length-prefixed UTF-8.
    StringField { name: String },
    /// One type-tag byte followed by a tag-determined payload.
    TaggedValue { name: String },
    /// Payload only; the tag comes from caller context.
    UntaggedValue { name: String },
    /// One tag byte plus an objectID-wide id.
    TaggedObjectRef { name: String },
    /// Code location composite: tag, classID, methodID, u64 index.
    Location { name: String },
    /// u32 count followed by that many elements.
    Repeat { name: String, element: Box<Argument> },
    /// Fixed-order composite with no length prefix.
    Group { name: String, fields: Vec<Argument> },
    /// Discriminated union.
    Select {
        name: String,
        discriminant: Box<Argument>,
        alts: HashMap<i64, Alt>,
    },
    /// One type-tag byte, u32 count, then uniform values.
    TypedSequence { name: String },
}

impl Argument {
    pub fn name(&self) -> &str {
        match self {
            Argument::Primitive { name, .. }
            | Argument::StringField { name }
            | Argument::TaggedValue { name }
            | Argument::UntaggedValue { name }
            | Argument::TaggedObjectRef { name }
            | Argument::Location { name }
            | Argument::Repeat { name, .. }
            | Argument::Group { name, .. }
            | Argument::Select { name, .. }
            | Argument::TypedSequence { name } => name,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Alt {
    pub name: String,
    pub value: i64,
    pub fields: Vec<Argument>,
}

impl Spec {
    /// Parses spec text into a `Spec`. Any malformed form fails the whole
    /// parse; a partial spec is never returned.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        // The published spec text is inconsistent about whitespace around
        // `=` in declarations like `Constant FOO = 1`; normalize it away so
        // every declaration tokenizes as a single `name=value` token.
        let normalized = normalize_equals(text);
        let forms = sexpr::parse(&normalized)?;

        // Constant sets are built first: Alt discriminants in command sets
        // may refer to them symbolically.
        let mut constant_sets = HashMap::new();
        for form in &forms {
            if form.head() == Some("ConstantSet") {
                let set = ConstantSet::from_form(expect_list(form)?)?;
                let name = set.name.clone();
                if constant_sets.insert(name.clone(), set).is_some() {
                    return Err(ParseError::DuplicateDeclaration { name });
                }
            }
        }

        let mut command_sets = HashMap::new();
        for form in &forms {
            match form.head() {
                Some("ConstantSet") => {}
                Some("CommandSet") => {
                    let set = CommandSet::from_form(expect_list(form)?, &constant_sets)?;
                    let name = set.name.clone();
                    if command_sets.insert(name.clone(), set).is_some() {
                        return Err(ParseError::DuplicateDeclaration { name });
                    }
                }
                other => {
                    return Err(ParseError::UnknownForm {
                        form: other.unwrap_or("<non-form>").to_string(),
                    })
                }
            }
        }

        Ok(Spec {
            command_sets,
            constant_sets,
        })
    }

    pub fn command_set(&self, name: &str) -> Result<&CommandSet, ParseError> {
        self.command_sets
            .get(name)
            .ok_or_else(|| ParseError::UnknownCommandSet {
                name: name.to_string(),
            })
    }

    pub fn command(&self, set: &str, name: &str) -> Result<&Command, ParseError> {
        self.command_set(set)?.command(name)
    }

    pub fn constant_set(&self, name: &str) -> Result<&ConstantSet, ParseError> {
        self.constant_sets
            .get(name)
            .ok_or_else(|| ParseError::UnknownConstantSet {
                name: name.to_string(),
            })
    }

    pub fn constant(&self, set: &str, name: &str) -> Result<&Constant, ParseError> {
        self.constant_set(set)?.constant(name)
    }

    pub fn command_sets(&self) -> impl Iterator<Item = &CommandSet> {
        self.command_sets.values()
    }

    pub fn constant_sets(&self) -> impl Iterator<Item = &ConstantSet> {
        self.constant_sets.values()
    }
}

impl CommandSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn command(&self, name: &str) -> Result<&Command, ParseError> {
        self.commands
            .get(name)
            .ok_or_else(|| ParseError::UnknownCommand {
                set: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    fn from_form(
        items: &[Sexpr],
        constant_sets: &HashMap<String, ConstantSet>,
    ) -> Result<Self, ParseError> {
        let (name, id) = split_declaration(token_at(items, 1)?)?;
        let mut commands = HashMap::new();
        for item in items.iter().skip(2) {
            match item {
                Sexpr::Literal(_) => {}
                _ => {
                    let body = expect_list(item)?;
                    if body.first().and_then(Sexpr::as_token) != Some("Command") {
                        return Err(ParseError::UnknownForm {
                            form: item.head().unwrap_or("<non-form>").to_string(),
                        });
                    }
                    let command = Command::from_form(body, id, constant_sets)?;
                    let name = command.name.clone();
                    if commands.insert(name.clone(), command).is_some() {
                        return Err(ParseError::DuplicateDeclaration { name });
                    }
                }
            }
        }
        Ok(CommandSet { name, id, commands })
    }
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn command_set_id(&self) -> u8 {
        self.command_set_id
    }

    pub fn request(&self) -> &[Argument] {
        &self.request
    }

    pub fn response(&self) -> &[Argument] {
        &self.response
    }

    /// Error names the spec declares for this command. Informational only;
    /// nothing is enforced against them.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn from_form(
        items: &[Sexpr],
        command_set_id: u8,
        constant_sets: &HashMap<String, ConstantSet>,
    ) -> Result<Self, ParseError> {
        let (name, id) = split_declaration(token_at(items, 1)?)?;
        let body: Vec<&[Sexpr]> = items
            .iter()
            .skip(2)
            .filter(|item| !matches!(item, Sexpr::Literal(_)))
            .map(expect_list)
            .collect::<Result<_, _>>()?;

        // An event command carries a single `(Event name args...)` form in
        // place of Out/Reply: nothing is ever sent, and the response is the
        // composite event payload.
        if let Some(event) = body
            .iter()
            .find(|form| form.first().and_then(Sexpr::as_token) == Some("Event"))
        {
            let response = parse_argument_list(&event[2..], constant_sets)?;
            check_field_collisions(&response)?;
            return Ok(Command {
                name,
                id,
                command_set_id,
                request: Vec::new(),
                response,
                errors: Vec::new(),
            });
        }

        let mut request = Vec::new();
        let mut response = Vec::new();
        let mut errors = Vec::new();
        for form in &body {
            match form.first().and_then(Sexpr::as_token) {
                Some("Out") => request = parse_argument_list(&form[1..], constant_sets)?,
                Some("Reply") => response = parse_argument_list(&form[1..], constant_sets)?,
                Some("ErrorSet") => errors = parse_error_set(&form[1..])?,
                other => {
                    return Err(ParseError::UnknownForm {
                        form: other.unwrap_or("<non-form>").to_string(),
                    })
                }
            }
        }
        check_field_collisions(&request)?;
        check_field_collisions(&response)?;
        Ok(Command {
            name,
            id,
            command_set_id,
            request,
            response,
            errors,
        })
    }
}

impl ConstantSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constant(&self, name: &str) -> Result<&Constant, ParseError> {
        self.constants
            .get(name)
            .ok_or_else(|| ParseError::UnknownConstant {
                set: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn constants(&self) -> impl Iterator<Item = &Constant> {
        self.constants.values()
    }

    fn from_form(items: &[Sexpr]) -> Result<Self, ParseError> {
        let name = token_at(items, 1)?.to_string();
        let mut constants = HashMap::new();
        for item in items.iter().skip(2) {
            match item {
                Sexpr::Literal(_) => {}
                _ => {
                    let body = expect_list(item)?;
                    if body.first().and_then(Sexpr::as_token) != Some("Constant") {
                        return Err(ParseError::UnknownForm {
                            form: item.head().unwrap_or("<non-form>").to_string(),
                        });
                    }
                    let constant = Constant::from_declaration(token_at(body, 1)?)?;
                    let name = constant.name.clone();
                    if constants.insert(name.clone(), constant).is_some() {
                        return Err(ParseError::DuplicateDeclaration { name });
                    }
                }
            }
        }
        Ok(ConstantSet { name, constants })
    }
}

impl Constant {
    fn from_declaration(declaration: &str) -> Result<Self, ParseError> {
        let (name, value_str) =
            declaration
                .split_once('=')
                .ok_or_else(|| ParseError::MalformedDeclaration {
                    token: declaration.to_string(),
                })?;
        let value = if let Some(hex) = value_str.strip_prefix("0x") {
            ConstantValue::Int(i64::from_str_radix(hex, 16).map_err(|_| {
                ParseError::MalformedDeclaration {
                    token: declaration.to_string(),
                }
            })?)
        } else if value_str.starts_with('\'') {
            let ch = value_str
                .trim_matches('\'')
                .chars()
                .next()
                .ok_or_else(|| ParseError::MalformedDeclaration {
                    token: declaration.to_string(),
                })?;
            ConstantValue::Char(ch)
        } else if let Ok(v) = value_str.parse::<i64>() {
            ConstantValue::Int(v)
        } else {
            ConstantValue::Str(value_str.to_string())
        };
        Ok(Constant {
            name: name.to_string(),
            value,
        })
    }
}

fn parse_argument_list(
    forms: &[Sexpr],
    constant_sets: &HashMap<String, ConstantSet>,
) -> Result<Vec<Argument>, ParseError> {
    forms
        .iter()
        .filter(|form| !matches!(form, Sexpr::Literal(_)))
        .map(|form| parse_argument(expect_list(form)?, constant_sets))
        .collect()
}

fn parse_argument(
    items: &[Sexpr],
    constant_sets: &HashMap<String, ConstantSet>,
) -> Result<Argument, ParseError> {
    let head = token_at(items, 0)?;
    let name = token_at(items, 1)?.to_string();
    // Descriptive literals may sit between the name and the nested forms.
    let nested: Vec<&Sexpr> = items[2..]
        .iter()
        .filter(|form| !matches!(form, Sexpr::Literal(_)))
        .collect();
    match head {
        "Repeat" => {
            let element_form = nested.first().ok_or(ParseError::MissingToken { index: 2 })?;
            let element = parse_argument(expect_list(element_form)?, constant_sets)?;
            Ok(Argument::Repeat {
                name,
                element: Box::new(element),
            })
        }
        "Group" => {
            let fields = parse_argument_list(&items[2..], constant_sets)?;
            check_field_collisions(&fields)?;
            Ok(Argument::Group { name, fields })
        }
        "Select" => {
            let discriminant_form = nested.first().ok_or(ParseError::MissingToken { index: 2 })?;
            let discriminant = parse_argument(expect_list(discriminant_form)?, constant_sets)?;
            let mut alts = HashMap::new();
            for form in &nested[1..] {
                let alt = parse_alt(expect_list(form)?, constant_sets)?;
                if let Some(previous) = alts.insert(alt.value, alt) {
                    return Err(ParseError::DuplicateDeclaration {
                        name: format!("{}={}", previous.name, previous.value),
                    });
                }
            }
            Ok(Argument::Select {
                name,
                discriminant: Box::new(discriminant),
                alts,
            })
        }
        "string" => Ok(Argument::StringField { name }),
        "value" => Ok(Argument::TaggedValue { name }),
        "untagged-value" => Ok(Argument::UntaggedValue { name }),
        "tagged-object" => Ok(Argument::TaggedObjectRef { name }),
        "location" => Ok(Argument::Location { name }),
        "typed-sequence" => Ok(Argument::TypedSequence { name }),
        // Any other head is a primitive type name; width resolution happens
        // in the codec against the negotiated id sizes.
        _ => Ok(Argument::Primitive {
            type_name: head.to_string(),
            name,
        }),
    }
}

fn parse_alt(
    items: &[Sexpr],
    constant_sets: &HashMap<String, ConstantSet>,
) -> Result<Alt, ParseError> {
    if token_at(items, 0)? != "Alt" {
        return Err(ParseError::UnknownForm {
            form: token_at(items, 0)?.to_string(),
        });
    }
    let declaration = token_at(items, 1)?;
    let (name, position) =
        declaration
            .split_once('=')
            .ok_or_else(|| ParseError::MalformedDeclaration {
                token: declaration.to_string(),
            })?;
    let value = resolve_alt_position(position, constant_sets)?;
    let fields = parse_argument_list(&items[2..], constant_sets)?;
    check_field_collisions(&fields)?;
    Ok(Alt {
        name: name.to_string(),
        value,
        fields,
    })
}

/// Resolves an `Alt` position: either a bare number, or a dotted constant
/// reference (e.g. `JDWP.EventKind.BREAKPOINT`) whose second-to-last segment
/// names the constant set.
fn resolve_alt_position(
    position: &str,
    constant_sets: &HashMap<String, ConstantSet>,
) -> Result<i64, ParseError> {
    if let Ok(value) = position.parse::<i64>() {
        return Ok(value);
    }
    let segments: Vec<&str> = position.split('.').collect();
    if segments.len() < 2 {
        return Err(ParseError::MalformedDeclaration {
            token: position.to_string(),
        });
    }
    let set_name = segments[segments.len() - 2];
    let constant_name = segments[segments.len() - 1];
    let set = constant_sets
        .get(set_name)
        .ok_or_else(|| ParseError::UnknownConstantSet {
            name: set_name.to_string(),
        })?;
    let constant = set.constant(constant_name)?;
    constant
        .value
        .as_i64()
        .ok_or_else(|| ParseError::MalformedDeclaration {
            token: position.to_string(),
        })
}

fn parse_error_set(forms: &[Sexpr]) -> Result<Vec<String>, ParseError> {
    let mut errors = Vec::new();
    for form in forms {
        if matches!(form, Sexpr::Literal(_)) {
            continue;
        }
        let items = expect_list(form)?;
        if token_at(items, 0)? != "Error" {
            return Err(ParseError::UnknownForm {
                form: token_at(items, 0)?.to_string(),
            });
        }
        errors.push(token_at(items, 1)?.to_string());
    }
    Ok(errors)
}

/// Duplicate names within one positional field list would make the decoded
/// record ambiguous, so they are rejected at parse time.
fn check_field_collisions(fields: &[Argument]) -> Result<(), ParseError> {
    let mut seen = std::collections::HashSet::new();
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(ParseError::DuplicateField {
                name: field.name().to_string(),
            });
        }
    }
    Ok(())
}

fn split_declaration(declaration: &str) -> Result<(String, u8), ParseError> {
    let (name, id_str) =
        declaration
            .split_once('=')
            .ok_or_else(|| ParseError::MalformedDeclaration {
                token: declaration.to_string(),
            })?;
    let id = id_str
        .parse::<u8>()
        .map_err(|_| ParseError::MalformedDeclaration {
            token: declaration.to_string(),
        })?;
    Ok((name.to_string(), id))
}

fn token_at<'a>(items: &'a [Sexpr], index: usize) -> Result<&'a str, ParseError> {
    items
        .get(index)
        .and_then(Sexpr::as_token)
        .ok_or(ParseError::MissingToken { index })
}

fn expect_list(form: &Sexpr) -> Result<&[Sexpr], ParseError> {
    form.as_list().ok_or_else(|| ParseError::UnknownForm {
        form: form.as_token().unwrap_or("<literal>").to_string(),
    })
}

fn normalize_equals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            // Collapse `name = value` to `name=value`, leaving other
            // whitespace untouched.
            let mut buffered = String::new();
            buffered.push(ch);
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    buffered.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek() == Some(&'=') {
                continue;
            }
            out.push_str(&buffered);
        } else if ch == '=' {
            out.push('=');
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    chars.next();
                } else {
                    break;
                }
            }
        } else {
            out.push(ch);
        }
    }
    out
}
