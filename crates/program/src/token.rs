//! Minimal fungible-token ledger backing farm and reward vaults.

use kfarms_core::{FarmError, FarmResult, Pubkey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    pub mint_authority: Pubkey,
    pub decimals: u8,
    pub supply: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

impl Mint {
    pub fn mint_to(&mut self, to: &mut TokenAccount, amount: u64) -> FarmResult<()> {
        self.supply = self
            .supply
            .checked_add(amount)
            .ok_or(FarmError::IntegerOverflow)?;
        to.amount = to
            .amount
            .checked_add(amount)
            .ok_or(FarmError::IntegerOverflow)?;
        Ok(())
    }
}

impl TokenAccount {
    pub fn new(mint: Pubkey, owner: Pubkey) -> Self {
        Self {
            mint,
            owner,
            amount: 0,
        }
    }

    pub fn debit(&mut self, amount: u64) -> FarmResult<()> {
        self.amount = self.amount.checked_sub(amount).ok_or_else(|| {
            tracing::warn!(balance = self.amount, amount, "insufficient token balance");
            FarmError::InsufficientFunds
        })?;
        Ok(())
    }

    pub fn credit(&mut self, amount: u64) -> FarmResult<()> {
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or(FarmError::IntegerOverflow)?;
        Ok(())
    }
}

/// Moves `amount` between two accounts of the same mint.
pub fn transfer(from: &mut TokenAccount, to: &mut TokenAccount, amount: u64) -> FarmResult<()> {
    if from.mint != to.mint {
        return Err(FarmError::UnexpectedAccount);
    }
    from.debit(amount)?;
    to.credit(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_transfer() {
        let mint_key = Pubkey::repeat_byte(1);
        let mut mint = Mint {
            decimals: 6,
            ..Default::default()
        };
        let mut a = TokenAccount::new(mint_key, Pubkey::repeat_byte(2));
        let mut b = TokenAccount::new(mint_key, Pubkey::repeat_byte(3));

        mint.mint_to(&mut a, 100).unwrap();
        assert_eq!(mint.supply, 100);

        transfer(&mut a, &mut b, 60).unwrap();
        assert_eq!((a.amount, b.amount), (40, 60));

        assert_eq!(transfer(&mut a, &mut b, 41), Err(FarmError::InsufficientFunds));
        assert_eq!((a.amount, b.amount), (40, 60));
    }

    #[test]
    fn cross_mint_transfer_is_rejected() {
        let mut a = TokenAccount::new(Pubkey::repeat_byte(1), Pubkey::ZERO);
        let mut b = TokenAccount::new(Pubkey::repeat_byte(2), Pubkey::ZERO);
        a.amount = 10;
        assert_eq!(transfer(&mut a, &mut b, 1), Err(FarmError::UnexpectedAccount));
    }
}
