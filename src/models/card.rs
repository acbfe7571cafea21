//! Payment card items.

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardData {
    pub cardholder_name: Option<String>,
    pub brand: Option<String>,
    pub number: Option<String>,
    pub exp_month: Option<String>,
    pub exp_year: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Card {
    pub cardholder_name: Option<EncryptedField>,
    pub brand: Option<EncryptedField>,
    pub number: Option<EncryptedField>,
    pub exp_month: Option<EncryptedField>,
    pub exp_year: Option<EncryptedField>,
    pub code: Option<EncryptedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardView {
    pub cardholder_name: Option<String>,
    pub brand: Option<String>,
    pub number: Option<String>,
    pub exp_month: Option<String>,
    pub exp_year: Option<String>,
    pub code: Option<String>,
}

crate::encodable!(
    Card, CardData, CardView,
    encrypted: [cardholder_name, brand, number, exp_month, exp_year, code],
    plain: [],
);
crate::flat_codec!(Card, CardData, CardView);

impl CardView {
    /// `"<brand>, *<last four>"`, or whichever half is known.
    pub fn subtitle(&self) -> Option<String> {
        let brand = self.brand.as_deref().filter(|b| !b.is_empty());
        let last_four = self.last_four();
        match (brand, last_four) {
            (Some(brand), Some(digits)) => Some(format!("{brand}, *{digits}")),
            (Some(brand), None) => Some(brand.to_string()),
            (None, Some(digits)) => Some(format!("*{digits}")),
            (None, None) => None,
        }
    }

    /// The card number with all but the last four characters masked.
    pub fn masked_number(&self) -> Option<String> {
        let number = self.number.as_deref().filter(|n| !n.is_empty())?;
        let chars: Vec<char> = number.chars().collect();
        let visible = chars.len().min(4);
        let mut masked = "•".repeat(chars.len() - visible);
        masked.extend(&chars[chars.len() - visible..]);
        Some(masked)
    }

    fn last_four(&self) -> Option<String> {
        let number = self.number.as_deref()?;
        let chars: Vec<char> = number.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.is_empty() {
            return None;
        }
        let start = chars.len().saturating_sub(4);
        Some(chars[start..].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SymmetricKey;

    #[test]
    fn subtitle_and_mask() {
        let view = CardView {
            brand: Some("Visa".into()),
            number: Some("4111 1111 1111 1234".into()),
            ..Default::default()
        };
        assert_eq!(view.subtitle().as_deref(), Some("Visa, *1234"));
        assert_eq!(
            view.masked_number().as_deref(),
            Some("•••••••••••••••1234")
        );

        let bare = CardView::default();
        assert_eq!(bare.subtitle(), None);
        assert_eq!(bare.masked_number(), None);
    }

    #[tokio::test]
    async fn card_round_trips() {
        let key = SymmetricKey::generate();
        let view = CardView {
            cardholder_name: Some("A. Person".into()),
            number: Some("4111111111111111".into()),
            code: Some("123".into()),
            ..Default::default()
        };
        let card = Card::encrypt(&view, &key).unwrap();
        assert!(card.brand.is_none());
        assert_eq!(Card::from_data(&card.to_data()).decrypt(&key).await, view);
    }
}
