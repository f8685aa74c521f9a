//! Dictionary text assembly.
//!
//! Output is canonical: entries in ascending type id order, one member per
//! line, a tab per nesting level, and the type, qualifier and (complex) name
//! columns of each scope right-padded to the widest entry of that scope.

use crate::description::TypeDescription;
use crate::dictionary::TypeDictionary;
use crate::member::{Member, KEYWORD_ENUM, KEYWORD_PRIMITIVE, QUALIFIER_SEPARATOR};

/// Assemble the whole dictionary.
pub fn assemble(dictionary: &TypeDictionary) -> String {
    let mut out = String::new();
    for description in dictionary.descriptions() {
        assemble_description(&mut out, description);
    }
    out
}

/// Append one type entry to `out`.
pub fn assemble_description(out: &mut String, description: &TypeDescription) {
    out.push_str(&description.type_id().to_string());
    out.push(' ');
    out.push_str(description.type_name());
    out.push_str(" {\n");
    assemble_scope(out, description.all_members(), 1);
    out.push_str("}\n");
}

/// Column widths of one scope.
struct Widths {
    type_name: usize,
    qualifier: usize,
    complex_name: usize,
}

impl Widths {
    fn of(members: &[Member]) -> Self {
        let mut widths = Widths {
            type_name: 0,
            qualifier: 0,
            complex_name: 0,
        };
        for member in members.iter().filter(|m| m.is_field_like()) {
            widths.type_name = widths.type_name.max(member.type_name().chars().count());
            if let Some(q) = member.qualifier() {
                widths.qualifier = widths.qualifier.max(q.chars().count());
            }
            if matches!(member, Member::Complex(_)) {
                widths.complex_name = widths.complex_name.max(member.name().chars().count());
            }
        }
        widths
    }
}

fn assemble_scope(out: &mut String, members: &[Member], depth: usize) {
    let widths = Widths::of(members);
    for member in members {
        indent(out, depth);
        match member {
            Member::Primitive(p) => {
                out.push_str(KEYWORD_PRIMITIVE);
                out.push(' ');
                out.push_str(&p.definition);
                out.push('\n');
            }
            Member::EnumConstant(e) => {
                out.push_str(KEYWORD_ENUM);
                out.push(' ');
                out.push_str(&e.name);
                out.push('\n');
            }
            Member::Complex(c) => {
                field_columns(out, member, &widths);
                pad(out, &c.name, widths.complex_name);
                out.push_str(" [\n");
                assemble_scope(out, &c.nested, depth + 1);
                indent(out, depth);
                out.push_str("]\n");
            }
            Member::Field(_) | Member::VariableLength(_) => {
                field_columns(out, member, &widths);
                out.push_str(member.name());
                out.push('\n');
            }
        }
    }
}

/// Type and qualifier columns, up to where the name starts.
fn field_columns(out: &mut String, member: &Member, widths: &Widths) {
    pad(out, member.type_name(), widths.type_name);
    out.push(' ');
    if widths.qualifier > 0 {
        match member.qualifier() {
            Some(q) => {
                pad(out, q, widths.qualifier);
                out.push(QUALIFIER_SEPARATOR);
            }
            None => out.extend(std::iter::repeat(' ').take(widths.qualifier + 1)),
        }
    }
}

fn pad(out: &mut String, text: &str, width: usize) {
    out.push_str(text);
    let len = text.chars().count();
    if len < width {
        out.extend(std::iter::repeat(' ').take(width - len));
    }
}

fn indent(out: &mut String, depth: usize) {
    out.extend(std::iter::repeat('\t').take(depth));
}
