use crate::{
    Error,
    Result,
    config::{
        CLOCK_OBJECT_ID,
        JackpotConfig,
        functions,
    },
    rpc::{
        ObjectContent,
        Owner,
        ReturnValue,
        SuiObject,
        SuiRpc,
        TransactionKind,
        ptb::{
            AccountAddress,
            CallArg,
        },
    },
    types::{
        Address,
        Mist,
        ObjectId,
        Pool,
        Registry,
        RoundInfo,
        RoundState,
    },
};
use wire::{
    Fields,
    WireOption,
};

mod wire;

const REGISTRY_STRUCT: &str = "GameRegistry";
const POOL_STRUCT: &str = "LotteryPool";
const CLOCK_INITIAL_SHARED_VERSION: u64 = 1;

/// Typed reads of the jackpot contract's objects and view functions.
///
/// No caching happens here; every call goes to the node.
pub struct LedgerGateway<R> {
    rpc: R,
    package_id: ObjectId,
    module_name: String,
}

impl<R: SuiRpc> LedgerGateway<R> {
    pub fn new(rpc: R, config: &JackpotConfig) -> Self {
        Self {
            rpc,
            package_id: config.package_id,
            module_name: config.module_name.clone(),
        }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub async fn get_registry(&self, id: &ObjectId) -> Result<Registry> {
        let (object, fields) = self.move_object("Registry", id, REGISTRY_STRUCT).await?;
        tracing::debug!(%id, ?fields, "registry fields");
        let current_round = wire::u64_field(&fields, "current_round")
            .map_err(|detail| Error::invalid(id, detail))?;
        let current_pool_id =
            optional_address(id, "current_pool_id", fields.get("current_pool_id"))?;
        Ok(Registry {
            id: object.object_id,
            current_round,
            current_pool_id,
        })
    }

    pub async fn get_pool(&self, id: &ObjectId) -> Result<Pool> {
        let (object, fields) = self.move_object("Pool", id, POOL_STRUCT).await?;
        let parse = |fields: &Fields| -> std::result::Result<Pool, String> {
            let state_raw = wire::u64_field(fields, "state")?;
            let state = RoundState::try_from(state_raw)
                .map_err(|other| format!("unknown round state {other}"))?;
            Ok(Pool {
                id: object.object_id,
                round_number: wire::u64_field(fields, "round_number")?,
                start_time: wire::u64_field(fields, "start_time")?,
                end_time: wire::u64_field(fields, "end_time")?,
                total_pool: Mist(wire::u64_field(fields, "total_pool")?),
                tickets: wire::tickets(fields)?,
                total_ticket_count: wire::u64_field(fields, "total_ticket_count")?,
                winner: None,
                state,
                airdrop_recipients: wire::address_list(fields, "airdrop_recipients")?,
            })
        };
        let mut pool = parse(&fields).map_err(|detail| Error::invalid(id, detail))?;
        pool.winner = optional_address(id, "winner", fields.get("winner"))?;
        Ok(pool)
    }

    pub async fn get_round_info(&self, pool_id: &ObjectId) -> Result<RoundInfo> {
        let inputs = vec![self.shared_input(pool_id, false).await?];
        let values = self
            .inspect(&Address::ZERO, functions::GET_ROUND_INFO, inputs)
            .await?;
        let [round, start, end, total, tickets, state] = values.as_slice() else {
            return Err(Error::invalid(
                pool_id,
                format!("get_round_info returned {} values, expected 6", values.len()),
            ));
        };
        let state_raw: u8 = state.decode()?;
        Ok(RoundInfo {
            round_number: round.decode()?,
            start_time: start.decode()?,
            end_time: end.decode()?,
            total_pool: Mist(total.decode()?),
            total_ticket_count: tickets.decode()?,
            state: RoundState::try_from(u64::from(state_raw)).map_err(|other| {
                Error::invalid(pool_id, format!("unknown round state {other}"))
            })?,
        })
    }

    /// Tickets held by `user` in the pool; zero when the call returns nothing.
    pub async fn get_user_tickets(&self, pool_id: &ObjectId, user: &Address) -> Result<u64> {
        let inputs = vec![
            self.shared_input(pool_id, false).await?,
            CallArg::pure(&AccountAddress::from(*user))?,
        ];
        let values = self
            .inspect(user, functions::GET_USER_TICKETS, inputs)
            .await?;
        match values.first() {
            Some(value) => value.decode(),
            None => Ok(0),
        }
    }

    pub async fn is_last_minute(&self, pool_id: &ObjectId, clock_id: &ObjectId) -> Result<bool> {
        let inputs = vec![
            self.shared_input(pool_id, false).await?,
            self.shared_input(clock_id, false).await?,
        ];
        let values = self
            .inspect(&Address::ZERO, functions::IS_LAST_MINUTE, inputs)
            .await?;
        match values.first() {
            Some(value) => value.decode(),
            None => Ok(false),
        }
    }

    /// The registry's own view of `(current_round, current_pool_id)`.
    pub async fn get_current_round_info(
        &self,
        registry_id: &ObjectId,
    ) -> Result<(u64, Option<ObjectId>)> {
        let inputs = vec![self.shared_input(registry_id, false).await?];
        let values = self
            .inspect(&Address::ZERO, functions::GET_CURRENT_ROUND_INFO, inputs)
            .await?;
        let [round, pool] = values.as_slice() else {
            return Err(Error::invalid(
                registry_id,
                format!(
                    "get_current_round_info returned {} values, expected 2",
                    values.len()
                ),
            ));
        };
        let pool: Option<[u8; 32]> = pool.decode()?;
        Ok((
            round.decode()?,
            pool.map(Address::new).filter(|id| !id.is_zero()),
        ))
    }

    pub async fn get_balance(&self, owner: &Address) -> Result<Mist> {
        self.rpc.get_balance(owner).await
    }

    async fn move_object(
        &self,
        what: &'static str,
        id: &ObjectId,
        expected_struct: &str,
    ) -> Result<(SuiObject, Fields)> {
        let object = self.rpc.get_object(id).await?.ok_or_else(|| Error::NotFound {
            what,
            id: id.to_string(),
        })?;
        let fields = match &object.content {
            None => {
                return Err(Error::NotFound {
                    what,
                    id: id.to_string(),
                });
            }
            Some(ObjectContent::Package) => {
                return Err(Error::invalid(id, "expected a Move object, found a package"));
            }
            Some(ObjectContent::MoveObject { type_, fields }) => {
                if wire::struct_name(type_) != expected_struct {
                    return Err(Error::invalid(
                        id,
                        format!("expected {expected_struct}, found {type_}"),
                    ));
                }
                wire::unwrap_struct(fields)
                    .cloned()
                    .ok_or_else(|| Error::invalid(id, "object fields are not a struct"))?
            }
        };
        Ok((object, fields))
    }

    async fn shared_input(&self, id: &ObjectId, mutable: bool) -> Result<CallArg> {
        if *id == CLOCK_OBJECT_ID {
            return Ok(CallArg::shared(*id, CLOCK_INITIAL_SHARED_VERSION, mutable));
        }
        let object = self.rpc.get_object(id).await?.ok_or_else(|| Error::NotFound {
            what: "Object",
            id: id.to_string(),
        })?;
        match object.owner {
            Some(Owner::Shared {
                initial_shared_version,
            }) => Ok(CallArg::shared(*id, initial_shared_version, mutable)),
            other => Err(Error::invalid(
                id,
                format!("expected a shared object, owner is {other:?}"),
            )),
        }
    }

    async fn inspect(
        &self,
        sender: &Address,
        function: &str,
        inputs: Vec<CallArg>,
    ) -> Result<Vec<ReturnValue>> {
        let tx = TransactionKind::move_call(self.package_id, &self.module_name, function, inputs);
        self.rpc.dev_inspect(sender, &tx).await
    }
}

fn optional_address(
    id: &ObjectId,
    field: &str,
    value: Option<&serde_json::Value>,
) -> Result<Option<Address>> {
    match wire::decode_optional_address(value) {
        WireOption::Absent => Ok(None),
        WireOption::Present(address) => Ok(Some(address)),
        WireOption::Unrecognized => {
            tracing::warn!(%id, field, ?value, "unrecognised optional value shape");
            Err(Error::invalid(
                id,
                format!("field '{field}' has an unrecognised optional shape"),
            ))
        }
    }
}
