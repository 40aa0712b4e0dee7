//! BCS model of the single-call programmable transactions we simulate.
//!
//! Variant order matters: BCS encodes an enum as its variant index, so every
//! enum here lists variants in the ledger's declaration order even where we
//! only ever build one of them.

use crate::{
    Error,
    Result,
    types::Address,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAddress(pub [u8; 32]);

impl From<Address> for AccountAddress {
    fn from(address: Address) -> Self {
        AccountAddress(*address.as_bytes())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TransactionKind {
    ProgrammableTransaction(ProgrammableTransaction),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgrammableTransaction {
    pub inputs: Vec<CallArg>,
    pub commands: Vec<Command>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CallArg {
    Pure(Vec<u8>),
    Object(ObjectArg),
}

impl CallArg {
    pub fn pure<T: Serialize>(value: &T) -> Result<Self> {
        let bytes = bcs::to_bytes(value)
            .map_err(|e| Error::invalid("pure argument", e.to_string()))?;
        Ok(CallArg::Pure(bytes))
    }

    pub fn address(address: Address) -> Result<Self> {
        Self::pure(&AccountAddress::from(address))
    }

    pub fn shared(id: Address, initial_shared_version: u64, mutable: bool) -> Self {
        CallArg::Object(ObjectArg::SharedObject {
            id: id.into(),
            initial_shared_version,
            mutable,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ObjectArg {
    ImmOrOwnedObject(ObjectRef),
    SharedObject {
        id: AccountAddress,
        initial_shared_version: u64,
        mutable: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub id: AccountAddress,
    pub version: u64,
    pub digest: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Command {
    MoveCall(Box<ProgrammableMoveCall>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgrammableMoveCall {
    pub package: AccountAddress,
    pub module: String,
    pub function: String,
    // only non-generic view functions are called
    pub type_arguments: Vec<TypeTag>,
    pub arguments: Vec<Argument>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TypeTag {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Argument {
    GasCoin,
    Input(u16),
    Result(u16),
    NestedResult(u16, u16),
}

impl TransactionKind {
    /// A transaction that calls `package::module::function` with every input
    /// passed positionally.
    pub fn move_call(
        package: Address,
        module: &str,
        function: &str,
        inputs: Vec<CallArg>,
    ) -> Self {
        let arguments = (0..inputs.len() as u16).map(Argument::Input).collect();
        TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
            inputs,
            commands: vec![Command::MoveCall(Box::new(ProgrammableMoveCall {
                package: package.into(),
                module: module.to_string(),
                function: function.to_string(),
                type_arguments: Vec::new(),
                arguments,
            }))],
        })
    }

    pub fn to_bcs(&self) -> Result<Vec<u8>> {
        bcs::to_bytes(self).map_err(|e| Error::invalid("transaction", e.to_string()))
    }

    /// The Move function this transaction calls, for logging and test doubles.
    pub fn function(&self) -> &str {
        let TransactionKind::ProgrammableTransaction(pt) = self;
        match pt.commands.first() {
            Some(Command::MoveCall(call)) => &call.function,
            None => "",
        }
    }

    pub fn inputs(&self) -> &[CallArg] {
        let TransactionKind::ProgrammableTransaction(pt) = self;
        &pt.inputs
    }
}

/// One BCS-encoded value returned by a simulated call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnValue {
    pub bytes: Vec<u8>,
    pub type_tag: String,
}

impl ReturnValue {
    pub fn new(bytes: Vec<u8>, type_tag: impl Into<String>) -> Self {
        Self {
            bytes,
            type_tag: type_tag.into(),
        }
    }

    pub fn encode<T: Serialize>(value: &T, type_tag: impl Into<String>) -> Result<Self> {
        let bytes = bcs::to_bytes(value)
            .map_err(|e| Error::invalid("return value", e.to_string()))?;
        Ok(Self::new(bytes, type_tag))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bcs::from_bytes(&self.bytes).map_err(|e| {
            Error::invalid(
                "return value",
                format!("cannot decode {} from {} bytes: {e}", self.type_tag, self.bytes.len()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn move_call__encodes_variant_indices_and_input_arguments() {
        // given
        let package = Address::from_u8(0x42);
        let inputs = vec![CallArg::shared(Address::from_u8(6), 1, false)];

        // when
        let bytes = TransactionKind::move_call(package, "m", "f", inputs)
            .to_bcs()
            .unwrap();

        // then
        let mut expected = vec![0u8, 1, 1, 1];
        expected.extend_from_slice(Address::from_u8(6).as_bytes());
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.push(0);
        expected.extend_from_slice(&[1, 0]);
        expected.extend_from_slice(package.as_bytes());
        expected.extend_from_slice(&[1, b'm', 1, b'f', 0, 1, 1, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn return_value__decodes_option_id() {
        // given
        let some = ReturnValue::encode(&Some([7u8; 32]), "0x1::option::Option<0x2::object::ID>")
            .unwrap();
        let none = ReturnValue::new(vec![0], "0x1::option::Option<0x2::object::ID>");

        // when / then
        assert_eq!(some.decode::<Option<[u8; 32]>>().unwrap(), Some([7u8; 32]));
        assert_eq!(none.decode::<Option<[u8; 32]>>().unwrap(), None);
    }

    #[test]
    fn return_value__short_payload_is_invalid_type() {
        let value = ReturnValue::new(vec![1, 2], "u64");
        assert!(matches!(value.decode::<u64>(), Err(Error::InvalidType { .. })));
    }
}
