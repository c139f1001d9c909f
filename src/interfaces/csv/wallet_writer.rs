use crate::application::engine::WalletRow;
use crate::error::{LedgerError, Result};
use std::io::Write;

/// Writes the final wallet balances as `owner,virtual_port,balance`.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, rows: impl IntoIterator<Item = WalletRow>) -> Result<()> {
        self.writer.write_record(["owner", "virtual_port", "balance"])?;
        for row in rows {
            self.writer.write_record([
                row.owner.as_str(),
                row.virtual_port.as_str(),
                row.balance.to_string().as_str(),
            ])?;
        }
        self.writer.flush().map_err(LedgerError::storage)
    }
}
