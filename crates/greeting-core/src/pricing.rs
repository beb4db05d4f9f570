//! Publish and reveal price list.
//!
//! Mobile money is priced in whole shillings, card/PayPal in whole dollars.

use serde::{Deserialize, Serialize};

use crate::types::{PaymentMethod, TemplateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Kes,
    Usd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: u32,
    pub currency: Currency,
}

impl Price {
    pub const fn kes(amount: u32) -> Self {
        Self {
            amount,
            currency: Currency::Kes,
        }
    }

    pub const fn usd(amount: u32) -> Self {
        Self {
            amount,
            currency: Currency::Usd,
        }
    }
}

/// Price of one action per payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub mpesa: Price,
    pub paypal: Price,
}

impl PriceQuote {
    pub fn for_method(&self, method: PaymentMethod) -> Price {
        match method {
            PaymentMethod::Mpesa => self.mpesa,
            PaymentMethod::Paypal => self.paypal,
        }
    }
}

/// Creator-side publish price for a template.
pub fn publish_quote(template: TemplateKind) -> PriceQuote {
    match template {
        TemplateKind::Classic => PriceQuote {
            mpesa: Price::kes(250),
            paypal: Price::usd(2),
        },
        TemplateKind::LoveLetter => PriceQuote {
            mpesa: Price::kes(350),
            paypal: Price::usd(3),
        },
        TemplateKind::Poem => PriceQuote {
            mpesa: Price::kes(500),
            paypal: Price::usd(5),
        },
    }
}

/// Viewer-side "reveal the answer" price, independent of template.
pub fn reveal_quote() -> PriceQuote {
    PriceQuote {
        mpesa: Price::kes(350),
        paypal: Price::usd(3),
    }
}
