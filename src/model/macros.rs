//! 模型定义宏

/// 便捷宏：定义模型
///
/// ```ignore
/// define_model! {
///     /// 角色
///     struct Role {
///         id: String => "_id" @primary,
///         lv: i64 => "lv",
///         name: String => "name",
///     }
///     collection = "role",
///     indexes = [
///         { fields: ["name"], unique: true },
///         { fields: ["-lv"], partial: "lv > int(0)" },
///     ],
/// }
/// ```
#[macro_export]
macro_rules! define_model {
    (
        $(#[$meta:meta])*
        struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $field_type:ty => $db_name:literal $(@ $flag:ident)?,
            )*
        }

        collection = $collection:expr,
        $(
            indexes = [
                $(
                    {
                        fields: [$($index_field:expr),* $(,)?]
                        $(, unique: $unique:expr)?
                        $(, sparse: $sparse:expr)?
                        $(, name: $index_name:expr)?
                        $(, partial: $partial:expr)?
                        $(, expire_after_secs: $expire:expr)?
                    }
                ),* $(,)?
            ],
        )?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $field_type,
            )*
        }

        impl $crate::model::traits::Model for $name {
            fn meta() -> $crate::model::field_types::ModelMeta {
                #[allow(unused_mut)]
                let mut meta = $crate::model::field_types::ModelMeta::new($collection);
                $(
                    meta = meta.field(
                        $crate::model::field_types::FieldMeta::new(stringify!($field), $db_name)
                            $(.$flag())?
                    );
                )*
                $(
                    $(
                        meta = meta.index(
                            $crate::model::field_types::IndexDefinition::new(
                                vec![$($index_field.to_string()),*]
                            )
                            $(.unique($unique))?
                            $(.sparse($sparse))?
                            $(.name($index_name))?
                            $(.partial($partial))?
                            $(.expire_after_secs($expire))?
                        );
                    )*
                )?
                meta
            }
        }
    };
}
