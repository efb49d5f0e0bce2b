//! Contract-level type system.
//!
//! Types here are already resolved: every struct, enum and contract name
//! refers to a definition known to the symbol table. Rendering a type back
//! to its Solidity spelling lives here as well so that every back-end
//! consumer agrees on it.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Boolean,
    /// Unsigned integer with the given bit width.
    Number(u16),
    Address,
    String,
    Bytes,
    FixedBytes(u8),
    Array(Box<Type>),
    Mapping(Box<Type>, Box<Type>),
    /// User-declared record type, emitted as a struct.
    Interface(String),
    Enum(String),
    Contract(String),
    Tuple(Vec<Type>),
}

/// Storage location required when a value of a type is a local or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLocation {
    Memory,
    Storage,
}

impl DataLocation {
    pub fn keyword(self) -> &'static str {
        match self {
            DataLocation::Memory => "memory",
            DataLocation::Storage => "storage",
        }
    }
}

impl Type {
    pub const UINT256: Type = Type::Number(256);

    pub fn mapping(key: Type, value: Type) -> Type {
        Type::Mapping(Box::new(key), Box::new(value))
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::String)
    }

    /// Value types live on the stack and never need a data location.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Boolean
                | Type::Number(_)
                | Type::Address
                | Type::FixedBytes(_)
                | Type::Enum(_)
                | Type::Contract(_)
        )
    }

    /// Reference types need `memory`/`storage` when used as locals,
    /// parameters or return values.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::String | Type::Bytes | Type::Array(_) | Type::Mapping(..) | Type::Interface(_)
        )
    }

    /// Element type produced by indexing, if the type is indexable.
    pub fn index_result(&self) -> Option<Type> {
        match self {
            Type::Array(element) => Some((**element).clone()),
            Type::Mapping(_, value) => Some((**value).clone()),
            Type::Bytes | Type::FixedBytes(_) => Some(Type::FixedBytes(1)),
            _ => None,
        }
    }

    /// Solidity spelling of the type, without a data location.
    pub fn solidity_name(&self) -> String {
        match self {
            Type::Void => String::new(),
            Type::Boolean => "bool".to_string(),
            Type::Number(bits) => format!("uint{bits}"),
            Type::Address => "address".to_string(),
            Type::String => "string".to_string(),
            Type::Bytes => "bytes".to_string(),
            Type::FixedBytes(size) => format!("bytes{size}"),
            Type::Array(element) => format!("{}[]", element.solidity_name()),
            Type::Mapping(key, value) => format!(
                "mapping({} => {})",
                key.solidity_name(),
                value.solidity_name()
            ),
            Type::Interface(name) | Type::Enum(name) | Type::Contract(name) => name.clone(),
            Type::Tuple(items) => {
                let items: Vec<String> = items.iter().map(Type::solidity_name).collect();
                format!("({})", items.join(", "))
            }
        }
    }

    /// `T memory` / `T storage` / `T` as needed for a declaration.
    pub fn declaration(&self, location: DataLocation) -> String {
        if self.is_reference() {
            format!("{} {}", self.solidity_name(), location.keyword())
        } else {
            self.solidity_name()
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.solidity_name())
    }
}

/// Resolve a type name that needs no symbol lookup.
///
/// Both the authoring aliases (`number`, `boolean`, `bigint`) and the
/// Solidity elementary names (`uint8`..`uint256`, `bytes1`..`bytes32`)
/// are accepted.
pub fn primitive(name: &str) -> Option<Type> {
    let ty = match name {
        "number" | "bigint" | "uint" => Type::UINT256,
        "boolean" | "bool" => Type::Boolean,
        "string" => Type::String,
        "address" => Type::Address,
        "bytes" => Type::Bytes,
        "void" => Type::Void,
        _ => {
            if let Some(bits) = name.strip_prefix("uint") {
                let bits: u16 = bits.parse().ok()?;
                if bits == 0 || bits > 256 || bits % 8 != 0 {
                    return None;
                }
                Type::Number(bits)
            } else if let Some(size) = name.strip_prefix("bytes") {
                let size: u8 = size.parse().ok()?;
                if size == 0 || size > 32 {
                    return None;
                }
                Type::FixedBytes(size)
            } else {
                return None;
            }
        }
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_primitive_aliases() {
        assert_eq!(primitive("number"), Some(Type::UINT256));
        assert_eq!(primitive("uint8"), Some(Type::Number(8)));
        assert_eq!(primitive("bytes32"), Some(Type::FixedBytes(32)));
        assert_eq!(primitive("uint7"), None);
        assert_eq!(primitive("bytes33"), None);
        assert_eq!(primitive("Point"), None);
    }

    #[test]
    fn renders_nested_mappings() {
        let ty = Type::mapping(Type::Address, Type::mapping(Type::Address, Type::UINT256));
        assert_eq!(
            ty.solidity_name(),
            "mapping(address => mapping(address => uint256))"
        );
    }

    #[test]
    fn reference_types_carry_a_location() {
        assert_eq!(Type::String.declaration(DataLocation::Memory), "string memory");
        assert_eq!(
            Type::array(Type::Address).declaration(DataLocation::Storage),
            "address[] storage"
        );
        assert_eq!(Type::Boolean.declaration(DataLocation::Memory), "bool");
    }
}
