//! Program-wide limits and PDA seeds.

pub const MAX_REWARDS_TOKENS: usize = 10;
pub const REWARD_CURVE_POINTS: usize = 20;
pub const BPS_DIV_FACTOR: u64 = 10_000;

pub const BASE_SEED_FARM_VAULT: &[u8] = b"fvault";
pub const BASE_SEED_REWARD_VAULT: &[u8] = b"rvault";
pub const BASE_SEED_REWARD_TREASURY_VAULT: &[u8] = b"tvault";
pub const BASE_SEED_FARM_VAULTS_AUTHORITY: &[u8] = b"authority";
pub const BASE_SEED_TREASURY_VAULTS_AUTHORITY: &[u8] = b"authority";
pub const BASE_SEED_USER_STATE: &[u8] = b"user";
