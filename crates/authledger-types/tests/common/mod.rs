use serde_json::{json, Value};

pub fn saml2_state() -> Value {
    json!({
        "Attributes": {
            "hrEduPersonPersistentID": ["ab12cd34@example.org"],
            "cn": ["Jane Doe"],
            "mail": ["jane.doe@example.org"]
        },
        "AuthnInstant": 1_660_000_000,
        "IdPMetadata": {
            "entityid": "https://idp.example.org/saml2/idp/metadata.php",
            "name": {"en": "Example IdP"}
        },
        "Destination": {
            "entityid": "https://sp.example.org/saml2/metadata",
            "name": {"en": "Example SP"}
        },
        "accounting": {
            "ClientIpAddress": "192.0.2.10"
        }
    })
}

pub fn oidc_state() -> Value {
    json!({
        "Attributes": {
            "hrEduPersonPersistentID": ["ab12cd34@example.org"]
        },
        "Oidc": {
            "OpenIdProviderMetadata": {
                "issuer": "https://op.example.org",
                "name": "Example OP"
            },
            "RelyingPartyMetadata": {
                "id": "client-123",
                "name": "Example RP"
            }
        }
    })
}
