//! Environment globals visible to contract code.
//!
//! These names never need a declaration: the EVM provides them. The parser
//! consults this table to resolve identifiers and to type builtin calls,
//! and mutability inference reads the `effect` tag to decide whether a
//! function is pure, view or payable.

use crate::types::Type;

/// What touching a builtin means for the enclosing function's mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Pure,
    /// Reads chain or transaction state.
    View,
    /// Reads the attached value; makes a public function payable.
    Payable,
}

/// A free builtin function such as `require` or `keccak256`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub returns: Type,
    pub effect: Effect,
}

/// A member of a builtin namespace such as `msg.sender` or `abi.encode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinMember {
    pub namespace: &'static str,
    pub name: &'static str,
    /// Type of the property, or the return type when it is called.
    pub ty: Type,
    pub callable: bool,
    pub effect: Effect,
}

pub const FUNCTIONS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "require",
        returns: Type::Void,
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "assert",
        returns: Type::Void,
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "keccak256",
        returns: Type::FixedBytes(32),
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "sha256",
        returns: Type::FixedBytes(32),
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "ripemd160",
        returns: Type::FixedBytes(20),
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "ecrecover",
        returns: Type::Address,
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "addmod",
        returns: Type::UINT256,
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "mulmod",
        returns: Type::UINT256,
        effect: Effect::Pure,
    },
    BuiltinFunction {
        name: "gasleft",
        returns: Type::UINT256,
        effect: Effect::View,
    },
    BuiltinFunction {
        name: "blockhash",
        returns: Type::FixedBytes(32),
        effect: Effect::View,
    },
    BuiltinFunction {
        name: "payable",
        returns: Type::Address,
        effect: Effect::Pure,
    },
];

pub const MEMBERS: &[BuiltinMember] = &[
    BuiltinMember {
        namespace: "msg",
        name: "sender",
        ty: Type::Address,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "msg",
        name: "value",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::Payable,
    },
    BuiltinMember {
        namespace: "msg",
        name: "data",
        ty: Type::Bytes,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "msg",
        name: "sig",
        ty: Type::FixedBytes(4),
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "timestamp",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "number",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "chainid",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "basefee",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "gaslimit",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "prevrandao",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "block",
        name: "coinbase",
        ty: Type::Address,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "tx",
        name: "origin",
        ty: Type::Address,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "tx",
        name: "gasprice",
        ty: Type::UINT256,
        callable: false,
        effect: Effect::View,
    },
    BuiltinMember {
        namespace: "abi",
        name: "encode",
        ty: Type::Bytes,
        callable: true,
        effect: Effect::Pure,
    },
    BuiltinMember {
        namespace: "abi",
        name: "encodePacked",
        ty: Type::Bytes,
        callable: true,
        effect: Effect::Pure,
    },
    BuiltinMember {
        namespace: "abi",
        name: "encodeWithSelector",
        ty: Type::Bytes,
        callable: true,
        effect: Effect::Pure,
    },
    BuiltinMember {
        namespace: "abi",
        name: "encodeWithSignature",
        ty: Type::Bytes,
        callable: true,
        effect: Effect::Pure,
    },
    BuiltinMember {
        namespace: "Math",
        name: "pow",
        ty: Type::UINT256,
        callable: true,
        effect: Effect::Pure,
    },
    BuiltinMember {
        namespace: "string",
        name: "concat",
        ty: Type::String,
        callable: true,
        effect: Effect::Pure,
    },
    BuiltinMember {
        namespace: "bytes",
        name: "concat",
        ty: Type::Bytes,
        callable: true,
        effect: Effect::Pure,
    },
];

/// Namespaces that exist only through their members.
const NAMESPACES: &[&str] = &["msg", "block", "tx", "abi", "Math", "string", "bytes"];

pub fn find_function(name: &str) -> Option<&'static BuiltinFunction> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

pub fn find_member(namespace: &str, name: &str) -> Option<&'static BuiltinMember> {
    MEMBERS
        .iter()
        .find(|m| m.namespace == namespace && m.name == name)
}

pub fn is_namespace(name: &str) -> bool {
    NAMESPACES.contains(&name)
}

/// Members of addresses and arrays that need no declaration.
pub fn value_member(receiver: &Type, name: &str) -> Option<Type> {
    match (receiver, name) {
        (Type::Address, "balance") => Some(Type::UINT256),
        (Type::Address, "code") => Some(Type::Bytes),
        (Type::Address, "codehash") => Some(Type::FixedBytes(32)),
        (Type::Array(_) | Type::Bytes | Type::FixedBytes(_), "length") => Some(Type::UINT256),
        _ => None,
    }
}

/// Address methods that move ether and therefore modify state.
pub fn is_transfer_method(name: &str) -> bool {
    matches!(name, "transfer" | "send" | "call" | "delegatecall")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_functions_and_members() {
        assert_eq!(find_function("keccak256").map(|f| &f.returns), Some(&Type::FixedBytes(32)));
        assert!(find_function("print").is_none());
        let value = find_member("msg", "value").expect("msg.value");
        assert_eq!(value.effect, Effect::Payable);
        assert!(find_member("msg", "nope").is_none());
    }

    #[test]
    fn namespaces_are_known() {
        assert!(is_namespace("block"));
        assert!(!is_namespace("token"));
    }
}
