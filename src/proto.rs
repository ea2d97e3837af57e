//! Generated wire types for the `GatewayEndpoints` service, plus small
//! constructors used when converting data source records into proto form.

tonic::include_proto!("authdata.v1");

impl Auth {
    /// Auth record for a public endpoint.
    #[must_use]
    pub fn no_auth() -> Self {
        Self {
            auth_type: Some(auth::AuthType::NoAuth(NoAuth {})),
        }
    }

    /// Auth record for an endpoint protected by a static API key.
    #[must_use]
    pub fn static_api_key(api_key: impl Into<String>) -> Self {
        Self {
            auth_type: Some(auth::AuthType::StaticApiKey(StaticApiKey {
                api_key: api_key.into(),
            })),
        }
    }

    /// Auth record for an endpoint restricted to a set of JWT users.
    #[must_use]
    pub fn jwt(authorized_users: impl IntoIterator<Item = String>) -> Self {
        Self {
            auth_type: Some(auth::AuthType::Jwt(Jwt {
                authorized_users: authorized_users
                    .into_iter()
                    .map(|user| (user, Empty {}))
                    .collect(),
            })),
        }
    }
}

impl CapacityLimitPeriod {
    /// Parses the period spelling used in gateway endpoints documents.
    ///
    /// Both the short form (`monthly`, case-insensitive) and the full enum
    /// name (`CAPACITY_LIMIT_PERIOD_MONTHLY`) are accepted.
    #[must_use]
    pub fn parse_document_value(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "DAILY" => Some(Self::Daily),
            "WEEKLY" => Some(Self::Weekly),
            "MONTHLY" => Some(Self::Monthly),
            other => Self::from_str_name(other),
        }
    }

    /// True for the periods a capacity limit can actually be enforced over.
    #[must_use]
    pub fn is_enforceable(self) -> bool {
        matches!(self, Self::Daily | Self::Weekly | Self::Monthly)
    }
}
