use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Database, Sqlite};

use crate::gallery::Id;

impl<T> sqlx::Type<Sqlite> for Id<T> {
    fn type_info() -> <Sqlite as Database>::TypeInfo {
        <i64 as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &<Sqlite as Database>::TypeInfo) -> bool {
        <i64 as sqlx::Type<Sqlite>>::compatible(ty)
    }
}

impl<'q, T> sqlx::Encode<'q, Sqlite> for Id<T> {
    fn encode_by_ref(&self, buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>) -> Result<IsNull, BoxDynError> {
        sqlx::Encode::<'q, Sqlite>::encode(self.get(), buf)
    }
}

impl<'r, T> sqlx::Decode<'r, Sqlite> for Id<T> {
    fn decode(value: <Sqlite as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
        let value = <i64 as sqlx::Decode<'r, Sqlite>>::decode(value)?;
        Ok(Id::new(value))
    }
}
