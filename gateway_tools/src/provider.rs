//! The upstream phone-number provider, reached over a 5sim-compatible REST API.
//!
//! The provider answers most errors with a plain-text body (`no free phones`, `order not found`, ...) rather than
//! JSON, sometimes with a 200 status. Both cases are mapped onto [`ProviderError`].
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use reqwest::{header::HeaderMap, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use smsr_engine::{
    db_types::{MicroUsd, ResourceStatus},
    traits::{NumberProvider, NumberRequest, ProviderError, ProvisionedNumber, SmsMessage, UpstreamStatus},
};

use crate::{
    config::ProviderConfig,
    helpers::decimal_to_minor_units,
    rest::{secret_header, RestClient},
    ClientError,
};

/// Prices are quoted with up to 6 decimal places, the same resolution as the ledger.
const PRICE_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSms {
    pub created_at: Option<DateTime<Utc>>,
    pub date: Option<DateTime<Utc>>,
    pub sender: Option<String>,
    #[serde(default)]
    pub text: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderOrder {
    pub id: i64,
    pub phone: String,
    pub operator: Option<String>,
    pub product: String,
    pub price: Value,
    pub status: String,
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sms: Vec<ProviderSms>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OperatorOffer {
    cost: Value,
    count: i64,
}

/// `country -> product -> operator -> offer`
type PriceTable = HashMap<String, HashMap<String, HashMap<String, OperatorOffer>>>;

pub fn upstream_status(status: &str) -> ResourceStatus {
    match status {
        "PENDING" | "RECEIVED" => ResourceStatus::Active,
        "FINISHED" => ResourceStatus::Completed,
        "CANCELED" | "BANNED" => ResourceStatus::Cancelled,
        "TIMEOUT" => ResourceStatus::Expired,
        other => {
            warn!("📞️ Unrecognised provider order status '{other}'");
            ResourceStatus::Unknown
        },
    }
}

impl From<ProviderSms> for SmsMessage {
    fn from(sms: ProviderSms) -> Self {
        SmsMessage {
            sender: sms.sender,
            text: sms.text,
            code: sms.code.filter(|c| !c.is_empty()),
            received_at: sms.date.or(sms.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Recognises the provider's plain-text refusals.
fn known_refusal(body: &str, context: &str) -> Option<ProviderError> {
    let text = body.trim().to_ascii_lowercase();
    match text.as_str() {
        "no free phones" | "no product" => Some(ProviderError::NoNumbersAvailable(context.to_string())),
        "order not found" | "record not found" => Some(ProviderError::NotFound(context.to_string())),
        "order has sms" | "order expired" | "hosting order" | "order no sms" => Some(ProviderError::Rejected(text)),
        _ => None,
    }
}

fn classify(e: ClientError, context: &str) -> ProviderError {
    if let ClientError::QueryError { message, .. } = &e {
        if let Some(refusal) = known_refusal(message, context) {
            return refusal;
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct SmsProviderClient {
    config: ProviderConfig,
    rest: RestClient,
}

impl SmsProviderClient {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Authorization", secret_header("Bearer ", &config.api_key)?);
        let rest = RestClient::new(&config.api_url, headers, timeout)?;
        Ok(Self { config, rest })
    }

    async fn order_query<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T, ProviderError> {
        let text =
            self.rest.rest_query_text::<()>(Method::GET, path, &[], None).await.map_err(|e| classify(e, context))?;
        // Plain-text refusals sometimes come with a 200
        serde_json::from_str::<T>(&text).map_err(|e| {
            known_refusal(&text, context).unwrap_or_else(|| ProviderError::InvalidResponse(format!("{e}: {text}")))
        })
    }

    pub async fn fetch_order(&self, upstream_id: &str) -> Result<ProviderOrder, ProviderError> {
        trace!("📞️ Checking order {upstream_id}");
        self.order_query(&format!("/v1/user/check/{}", urlencoding::encode(upstream_id)), upstream_id).await
    }
}

impl NumberProvider for SmsProviderClient {
    async fn quote_price(&self, request: &NumberRequest) -> Result<MicroUsd, ProviderError> {
        let params = [("country", request.country.as_str()), ("product", request.service.as_str())];
        let table = self
            .rest
            .rest_query::<PriceTable, ()>(Method::GET, "/v1/guest/prices", &params, None)
            .await
            .map_err(|e| classify(e, &request.service))?;
        let offers = table
            .get(&request.country)
            .and_then(|products| products.get(&request.service))
            .ok_or_else(|| ProviderError::NoNumbersAvailable(format!("{}/{}", request.service, request.country)))?;
        let mut prices = Vec::with_capacity(offers.len());
        for (operator, offer) in offers {
            if offer.count <= 0 || (self.config.operator != "any" && *operator != self.config.operator) {
                continue;
            }
            let micros = decimal_to_minor_units(&offer.cost, PRICE_DECIMALS)?;
            prices.push(MicroUsd::from(micros));
        }
        let price = prices
            .into_iter()
            .min()
            .ok_or_else(|| ProviderError::NoNumbersAvailable(format!("{}/{}", request.service, request.country)))?;
        debug!("📞️ Wholesale price for {}/{} is {price}", request.service, request.country);
        Ok(price)
    }

    async fn request_number(&self, request: &NumberRequest) -> Result<ProvisionedNumber, ProviderError> {
        let path = format!(
            "/v1/user/buy/activation/{}/{}/{}",
            urlencoding::encode(&request.country),
            urlencoding::encode(&self.config.operator),
            urlencoding::encode(&request.service)
        );
        let context = format!("{}/{}", request.service, request.country);
        let order = self.order_query::<ProviderOrder>(&path, &context).await?;
        let wholesale_cost = MicroUsd::from(decimal_to_minor_units(&order.price, PRICE_DECIMALS)?);
        info!("📞️ Provider issued {} for {context} as order {}", order.phone, order.id);
        Ok(ProvisionedNumber {
            upstream_id: order.id.to_string(),
            phone_number: order.phone,
            wholesale_cost,
            expires_at: order.expires,
        })
    }

    async fn check_status(&self, upstream_id: &str) -> Result<UpstreamStatus, ProviderError> {
        let order = self.fetch_order(upstream_id).await?;
        Ok(UpstreamStatus {
            status: upstream_status(&order.status),
            messages: order.sms.into_iter().map(SmsMessage::from).collect(),
        })
    }

    async fn cancel(&self, upstream_id: &str) -> Result<(), ProviderError> {
        let path = format!("/v1/user/cancel/{}", urlencoding::encode(upstream_id));
        let order = self.order_query::<ProviderOrder>(&path, upstream_id).await?;
        match upstream_status(&order.status) {
            ResourceStatus::Cancelled => {
                info!("📞️ Order {upstream_id} cancelled upstream");
                Ok(())
            },
            other => Err(ProviderError::Rejected(format!("Order {upstream_id} is {other} after cancellation"))),
        }
    }
}

#[cfg(test)]
mod test {
    use smsr_common::Secret;

    use super::*;

    const ORDER: &str = r#"{
        "id": 11631253,
        "phone": "+79000381454",
        "operator": "beeline",
        "product": "telegram",
        "price": 0.45,
        "status": "RECEIVED",
        "expires": "2024-06-25T13:55:32.612Z",
        "sms": [{
            "created_at": "2024-06-25T13:41:12.543Z",
            "date": "2024-06-25T13:41:12.543Z",
            "sender": "Telegram",
            "text": "Telegram code 58342",
            "code": "58342"
        }],
        "created_at": "2024-06-25T13:35:32.612Z"
    }"#;

    fn client(url: &str) -> SmsProviderClient {
        let config =
            ProviderConfig { api_url: url.to_string(), api_key: Secret::new("jwt".into()), operator: "any".into() };
        SmsProviderClient::new(config, Duration::from_secs(5)).unwrap()
    }

    fn request() -> NumberRequest {
        NumberRequest { service: "telegram".into(), country: "russia".into() }
    }

    #[tokio::test]
    async fn buys_a_number() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/user/buy/activation/russia/any/telegram")
            .match_header("authorization", "Bearer jwt")
            .with_status(200)
            .with_body(ORDER)
            .create_async()
            .await;
        let number = client(&server.url()).request_number(&request()).await.unwrap();
        assert_eq!(number.upstream_id, "11631253");
        assert_eq!(number.phone_number, "+79000381454");
        assert_eq!(number.wholesale_cost, MicroUsd::from(450_000));
        assert!(number.expires_at.is_some());
    }

    #[tokio::test]
    async fn out_of_stock() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/user/buy/activation/russia/any/telegram")
            .with_status(200)
            .with_body("no free phones")
            .create_async()
            .await;
        let err = client(&server.url()).request_number(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoNumbersAvailable(_)));
    }

    #[tokio::test]
    async fn provider_outage() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/user/buy/activation/russia/any/telegram")
            .with_status(502)
            .create_async()
            .await;
        let err = client(&server.url()).request_number(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn status_and_messages() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/v1/user/check/11631253").with_status(200).with_body(ORDER).create_async().await;
        let status = client(&server.url()).check_status("11631253").await.unwrap();
        assert_eq!(status.status, ResourceStatus::Active);
        assert_eq!(status.messages.len(), 1);
        assert_eq!(status.messages[0].code.as_deref(), Some("58342"));
    }

    #[tokio::test]
    async fn unknown_order() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/user/check/1")
            .with_status(404)
            .with_body("order not found")
            .create_async()
            .await;
        let err = client(&server.url()).check_status("1").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(id) if id == "1"));
    }

    #[tokio::test]
    async fn cancel_after_sms_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/user/cancel/11631253")
            .with_status(400)
            .with_body("order has sms")
            .create_async()
            .await;
        let err = client(&server.url()).cancel("11631253").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[tokio::test]
    async fn cheapest_operator_with_stock() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/guest/prices")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"russia":{"telegram":{
                "beeline":{"cost":0.45,"count":120,"rate":99.1},
                "mts":{"cost":0.3,"count":0,"rate":80.0},
                "virtual21":{"cost":0.38,"count":5,"rate":90.0}}}}"#,
            )
            .create_async()
            .await;
        let price = client(&server.url()).quote_price(&request()).await.unwrap();
        assert_eq!(price, MicroUsd::from(380_000));
    }

    #[test]
    fn statuses() {
        assert_eq!(upstream_status("PENDING"), ResourceStatus::Active);
        assert_eq!(upstream_status("FINISHED"), ResourceStatus::Completed);
        assert_eq!(upstream_status("TIMEOUT"), ResourceStatus::Expired);
        assert_eq!(upstream_status("BANNED"), ResourceStatus::Cancelled);
        assert_eq!(upstream_status("WEIRD"), ResourceStatus::Unknown);
    }
}
