use crate::admission::BookingRequest;
use crate::calendar::date_of;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_timestamp(ms: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&ms) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

pub(crate) fn validate_text(text: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if text.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

pub(crate) fn validate_optional_text(
    text: Option<&str>,
    max: usize,
    what: &'static str,
) -> Result<(), EngineError> {
    text.map_or(Ok(()), |t| validate_text(t, max, what))
}

/// Size and range limits on a booking request, checked before any lock is taken.
pub(crate) fn validate_request(request: &BookingRequest) -> Result<(), EngineError> {
    validate_text(request.member_id.as_str(), MAX_ID_LEN, "member id too long")?;
    validate_text(request.accommodation_id.as_str(), MAX_ID_LEN, "accommodation id too long")?;
    if let Some(titular) = &request.titular_member_id {
        validate_text(titular.as_str(), MAX_ID_LEN, "titular member id too long")?;
    }
    let earliest = date_of(MIN_VALID_TIMESTAMP_MS);
    let latest = date_of(MAX_VALID_TIMESTAMP_MS);
    if request.check_in < earliest || request.check_out > latest {
        return Err(EngineError::LimitExceeded("stay dates out of range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::date;

    fn request(check_in: &str, check_out: &str) -> BookingRequest {
        BookingRequest {
            member_id: MemberId::from("m1"),
            accommodation_id: AccommodationId::from("cabin-1"),
            check_in: date(check_in),
            check_out: date(check_out),
            guests: 2,
            titular_member_id: None,
        }
    }

    #[test]
    fn request_limits() {
        assert!(validate_request(&request("2024-07-01", "2024-07-03")).is_ok());
        assert!(matches!(
            validate_request(&request("1990-07-01", "1990-07-03")),
            Err(EngineError::LimitExceeded(_))
        ));

        let mut long_id = request("2024-07-01", "2024-07-03");
        long_id.member_id = MemberId::from("x".repeat(MAX_ID_LEN + 1));
        assert!(matches!(validate_request(&long_id), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn text_and_timestamp_limits() {
        assert!(validate_optional_text(None, 1, "notes").is_ok());
        assert!(validate_optional_text(Some("ab"), 1, "notes").is_err());
        assert!(validate_timestamp(now_ms()).is_ok());
        assert!(validate_timestamp(0).is_err());
    }
}
