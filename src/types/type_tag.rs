//! Helpers for Move type strings of the form `0x<address>::<module>::<Name><T, ...>`.

const ADDRESS_HEX_LEN: usize = 64;

/// A parsed, well-formed Move struct type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructTag<'a> {
    pub address: &'a str,
    pub module: &'a str,
    pub name: &'a str,
    /// Raw generic parameter list including the angle brackets, if any
    pub type_params: Option<&'a str>,
}

impl StructTag<'_> {
    pub fn is_generic(&self) -> bool {
        self.type_params.is_some()
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `0x` followed by exactly 64 hex digits (either case).
pub fn is_full_address(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(hex) => hex.len() == ADDRESS_HEX_LEN && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Parse `0x<64hex>::module::Name` with an optional trailing `<...>` list.
pub fn parse_struct_tag(s: &str) -> Option<StructTag<'_>> {
    let (head, type_params) = match s.find('<') {
        Some(idx) => {
            let params = &s[idx..];
            if !params.ends_with('>') || params.len() < 3 {
                return None;
            }
            (&s[..idx], Some(params))
        }
        None => (s, None),
    };

    let mut parts = head.split("::");
    let address = parts.next()?;
    let module = parts.next()?;
    let name = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    if !is_full_address(address) || !is_ident(module) || !is_ident(name) {
        return None;
    }

    Some(StructTag {
        address,
        module,
        name,
        type_params,
    })
}

/// Recover the owning `(package, module)` pair from a type string that may be
/// malformed past the module segment.
pub fn module_prefix(s: &str) -> Option<(&str, &str)> {
    let (address, rest) = s.split_once("::")?;
    if !is_full_address(address) {
        return None;
    }
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let module = &rest[..end];
    if module.is_empty() {
        return None;
    }
    Some((address, module))
}

/// Normalize the leading address of a type string so short forms (`0x2::sui::SUI`)
/// and prefix-less forms (`deb8...::coin::COIN`) compare equal to the full form.
pub fn normalize_type(s: &str) -> String {
    let trimmed = s.trim();
    let Some((address, rest)) = trimmed.split_once("::") else {
        return trimmed.to_string();
    };
    let hex = address.strip_prefix("0x").unwrap_or(address);
    if hex.is_empty() || hex.len() > ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return trimmed.to_string();
    }
    format!(
        "0x{:0>width$}::{}",
        hex.to_ascii_lowercase(),
        rest,
        width = ADDRESS_HEX_LEN
    )
}

pub fn same_type(a: &str, b: &str) -> bool {
    normalize_type(a) == normalize_type(b)
}
