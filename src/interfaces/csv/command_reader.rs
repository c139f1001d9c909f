use crate::application::engine::Command;
use crate::domain::house::HouseId;
use crate::domain::order::{OrderId, PaymentMethod, ProgressStage};
use crate::domain::topup::{ReviewDecision, TopUpId};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One raw row of a command script: `op,actor,target,amount,reference,detail`.
///
/// | op                  | actor     | target     | amount | reference     | detail                |
/// |---------------------|-----------|------------|--------|---------------|-----------------------|
/// | `topup`             | requester |            | yes    | free text     |                       |
/// | `approve`, `reject` | admin     | request id |        |               |                       |
/// | `transfer`          | payer     | payee      | yes    | free text     | description           |
/// | `buy`               | buyer     | house id   |        | card number   | `FULL`/`INSTALLMENT`  |
/// | `reserve`           | buyer     | house id   |        |               |                       |
/// | `return`, `cancel`  | requester | order id   |        |               | reason                |
/// | `progress`          | requester | order id   |        |               | stage                 |
/// | `viewing`           | seller    | order id   |        | RFC 3339 time | message               |
/// | `payout`            | admin     | order id   |        |               | `APPROVE`/`REJECT`    |
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    pub op: String,
    pub actor: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CommandRecord {
    fn required(&self, field: &'static str, value: &Option<String>) -> Result<String> {
        present(value.clone()).ok_or_else(|| {
            LedgerError::InvalidInput(format!("`{}` needs a {field}", self.op))
        })
    }

    fn id(&self) -> Result<u64> {
        let target = self.required("target id", &self.target)?;
        target
            .parse()
            .map_err(|_| LedgerError::InvalidInput(format!("`{target}` is not a valid id")))
    }

    fn amount(&self) -> Result<Decimal> {
        let amount = self.required("amount", &self.amount)?;
        Decimal::from_str(&amount)
            .map_err(|_| LedgerError::InvalidInput(format!("`{amount}` is not a valid amount")))
    }
}

impl TryFrom<CommandRecord> for Command {
    type Error = LedgerError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let op = record.op.to_ascii_lowercase();
        let actor = record.actor.clone();
        let command = match op.as_str() {
            "topup" => Command::SubmitTopUp {
                username: actor,
                amount: record.amount()?,
                reference: present(record.reference),
            },
            "approve" | "reject" => Command::ReviewTopUp {
                request: TopUpId(record.id()?),
                decision: op.parse()?,
                requester: actor,
            },
            "transfer" => Command::Transfer {
                from: actor,
                to: record.required("payee", &record.target)?,
                amount: record.amount()?,
                reference: present(record.reference),
                description: present(record.detail).unwrap_or_else(|| "Transfer".to_string()),
            },
            "buy" => Command::CreateOrder {
                house: HouseId(record.id()?),
                buyer: actor,
                method: record.detail.as_deref().unwrap_or_default().parse::<PaymentMethod>()?,
                card_number: present(record.reference),
            },
            "reserve" => Command::ReserveHouse {
                house: HouseId(record.id()?),
                buyer: actor,
            },
            "return" => Command::RequestReturn {
                order: OrderId(record.id()?),
                requester: actor,
                reason: present(record.detail),
            },
            "cancel" => Command::CancelOrder {
                order: OrderId(record.id()?),
                requester: actor,
                reason: present(record.detail),
            },
            "progress" => Command::AdvanceProgress {
                order: OrderId(record.id()?),
                requester: actor,
                stage: record.required("stage", &record.detail)?.parse::<ProgressStage>()?,
            },
            "viewing" => {
                let time = record.required("viewing time", &record.reference)?;
                let time = DateTime::parse_from_rfc3339(&time)
                    .map_err(|e| LedgerError::InvalidInput(format!("`{time}`: {e}")))?
                    .with_timezone(&Utc);
                Command::ScheduleViewing {
                    order: OrderId(record.id()?),
                    requester: actor,
                    time,
                    message: present(record.detail),
                }
            }
            "payout" => Command::ReviewPayout {
                order: OrderId(record.id()?),
                decision: record.required("decision", &record.detail)?.parse::<ReviewDecision>()?,
                requester: actor,
            },
            other => {
                return Err(LedgerError::InvalidInput(format!(
                    "unknown operation `{other}`"
                )));
            }
        };
        Ok(command)
    }
}

/// Reads commands from a CSV source.
///
/// Fields are trimmed and rows may stop after the last column they use.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily parses rows; a malformed row yields an error and reading goes on.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|row| row.map_err(LedgerError::from).and_then(Command::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    fn parse(data: &str) -> Vec<Result<Command>> {
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[test]
    fn test_reader_valid_stream() {
        let data = "op, actor, target, amount, reference, detail\n\
                    topup, alice, , 100.00, R1,\n\
                    approve, root, 1\n\
                    buy, alice, 7, , , FULL";
        let commands = parse(data);
        assert_eq!(commands.len(), 3);

        assert_eq!(
            commands[0].as_ref().unwrap(),
            &Command::SubmitTopUp {
                username: "alice".to_string(),
                amount: dec!(100.00),
                reference: Some("R1".to_string()),
            }
        );
        assert_eq!(
            commands[1].as_ref().unwrap(),
            &Command::ReviewTopUp {
                request: TopUpId(1),
                decision: ReviewDecision::Approve,
                requester: "root".to_string(),
            }
        );
        assert!(matches!(
            commands[2].as_ref().unwrap(),
            Command::CreateOrder { house: HouseId(7), method: PaymentMethod::Full, .. }
        ));
    }

    #[test]
    fn test_order_commands() {
        let data = "op,actor,target,amount,reference,detail\n\
                    progress,bob,3,,,viewing_scheduled\n\
                    viewing,bob,3,,2030-01-02T10:00:00Z,bring ID\n\
                    payout,root,3,,,reject\n\
                    return,alice,3";
        let commands = parse(data);
        assert!(matches!(
            commands[0].as_ref().unwrap(),
            Command::AdvanceProgress { stage: ProgressStage::ViewingScheduled, .. }
        ));
        assert!(matches!(
            commands[1].as_ref().unwrap(),
            Command::ScheduleViewing { message: Some(m), .. } if m == "bring ID"
        ));
        assert!(matches!(
            commands[2].as_ref().unwrap(),
            Command::ReviewPayout { decision: ReviewDecision::Reject, .. }
        ));
        assert!(matches!(
            commands[3].as_ref().unwrap(),
            Command::RequestReturn { reason: None, .. }
        ));
    }

    #[test]
    fn test_reader_malformed_lines() {
        let data = "op,actor,target,amount,reference,detail\n\
                    fly,alice\n\
                    topup,alice,,lots\n\
                    approve,root,abc\n\
                    buy,alice,7,,,LAYAWAY";
        for result in parse(data) {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
        }
    }
}
