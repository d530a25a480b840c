//! JSON-RPC implementation of [`ChainClient`] over alloy.
//!
//! Calldata for the three contract calls is hand-encoded (4-byte selector
//! plus 32-byte ABI words) - the surface is small enough that a full ABI
//! layer would be dead weight.

use crate::chain::{ChainClient, ChainError, TxReceipt};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::str::FromStr;
use tracing::debug;

/// Chain client bound to one wallet, one token, and one market contract.
pub struct RpcChainClient {
    provider: DynProvider,
    wallet_address: Address,
    token: Address,
    market: Address,
}

impl RpcChainClient {
    /// Connect over HTTP. The private key signs both the approval and the
    /// bet transaction.
    pub fn connect(
        rpc_url: &str,
        private_key: &str,
        token_address: &str,
        market_address: &str,
    ) -> Result<Self, ChainError> {
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| ChainError::Config(format!("bad private key: {e}")))?;
        let wallet_address = signer.address();

        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Config(format!("bad rpc url: {e}")))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        let token = Address::from_str(token_address)
            .map_err(|e| ChainError::Config(format!("bad token address: {e}")))?;
        let market = Address::from_str(market_address)
            .map_err(|e| ChainError::Config(format!("bad market address: {e}")))?;

        Ok(Self {
            provider,
            wallet_address,
            token,
            market,
        })
    }

    /// Address of the signing wallet.
    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    async fn call_u256(&self, to: Address, data: Vec<u8>) -> Result<U256, ChainError> {
        let req = TransactionRequest::default()
            .with_from(self.wallet_address)
            .with_to(to)
            .with_input(data);
        let out = self
            .provider
            .call(req)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(U256::from_be_slice(&out))
    }

    async fn send(&self, to: Address, data: Vec<u8>) -> Result<B256, ChainError> {
        let req = TransactionRequest::default()
            .with_from(self.wallet_address)
            .with_to(to)
            .with_input(data);
        let pending = self
            .provider
            .send_transaction(req)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(*pending.tx_hash())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn allowance(&self, owner: Address) -> Result<U256, ChainError> {
        let mut data = selector("allowance(address,address)").to_vec();
        data.extend_from_slice(&address_word(owner));
        data.extend_from_slice(&address_word(self.market));
        self.call_u256(self.token, data).await
    }

    async fn balance_of(&self, owner: Address) -> Result<U256, ChainError> {
        let mut data = selector("balanceOf(address)").to_vec();
        data.extend_from_slice(&address_word(owner));
        self.call_u256(self.token, data).await
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn submit_approval(&self, amount: U256) -> Result<B256, ChainError> {
        let mut data = selector("approve(address,uint256)").to_vec();
        data.extend_from_slice(&address_word(self.market));
        data.extend_from_slice(&amount.to_be_bytes::<32>());

        let hash = self.send(self.token, data).await?;
        debug!(tx = %hash, amount = %amount, "approval submitted");
        Ok(hash)
    }

    async fn submit_place_bet(&self, choice_code: u8, amount: U256) -> Result<B256, ChainError> {
        let mut data = selector("placeBet(uint8,uint256)").to_vec();
        data.extend_from_slice(&u8_word(choice_code));
        data.extend_from_slice(&amount.to_be_bytes::<32>());

        let hash = self.send(self.market, data).await?;
        debug!(tx = %hash, choice = choice_code, amount = %amount, "bet submitted");
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(receipt.map(|r| TxReceipt {
            success: r.status(),
            block_number: r.block_number,
        }))
    }
}

/// First four bytes of keccak256 of the function signature.
fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// An address left-padded to a 32-byte ABI word.
fn address_word(addr: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_slice());
    word
}

/// A uint8 right-aligned in a 32-byte ABI word.
fn u8_word(value: u8) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[31] = value;
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_known_erc20_values() {
        // Canonical ERC20 selectors, verifiable against any explorer.
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(
            selector("allowance(address,address)"),
            [0xdd, 0x62, 0xed, 0x3e]
        );
    }

    #[test]
    fn words_are_properly_aligned() {
        let addr = Address::repeat_byte(0x11);
        let word = address_word(addr);
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], addr.as_slice());

        let word = u8_word(1);
        assert_eq!(&word[..31], &[0u8; 31]);
        assert_eq!(word[31], 1);
    }
}
