//! Тексты интерфейса. Все сообщения пользователю живут здесь, чтобы
//! хендлеры не обрастали строковыми литералами.

pub const WELCOME: &str = "👋 Привет! Я Pulse — помогаю разобраться в результатах лабораторных анализов.\n\n\
Пришлите PDF или фото бланка, я извлеку показатели, учту ваш контекст и подготовлю понятный отчёт.\n\n\
⚠️ Я не ставлю диагнозы и не заменяю врача.";

pub const CONSENT_PROMPT: &str = "Прежде чем начать, подтвердите:\n\n\
• вам исполнилось 18 лет;\n\
• вы согласны с условиями использования и обработкой данных;\n\
• вы понимаете, что отчёт носит информационный характер и не является медицинской консультацией.";

pub const CONSENT_DECLINED: &str = "Без подтверждения я не могу анализировать документы. \
Когда будете готовы, нажмите «Подтверждаю».";

pub const MAIN_MENU: &str = "Что делаем?";

pub const UPLOAD_PROMPT: &str = "📄 Пришлите результаты анализов: PDF-файл или чёткое фото бланка.";

pub const UNSUPPORTED_FILE: &str = "❌ Такой тип файла я не читаю. Пришлите PDF, JPEG или PNG.";

pub const EXTRACTION_FAILED: &str = "😔 Не удалось прочитать документ. \
Попробуйте прислать более чёткое фото или PDF с текстовым слоем.";

pub const EXTRACTION_OK: &str = "✅ Документ прочитан. Теперь несколько коротких вопросов о вас — \
они помогут сделать разбор точнее.";

pub const PROCESSING: &str = "🧪 Анализирую результаты, это займёт меньше минуты…";

pub const STRUCTURING_FAILED: &str = "😔 Сервис анализа временно недоступен. \
Попытка не списана — попробуйте ещё раз через пару минут.";

pub const PAYWALL: &str = "🔒 Для разбора анализов нужна активная подписка с доступными разборами.\n\n\
Посмотрите тарифы — разбор занимает минуту, а вопросы к результатам можно задать прямо здесь.";

pub const REPORT_FOOTER: &str = "⚠️ Отчёт носит информационный характер и не заменяет консультацию врача.";

pub const FOLLOW_UP_PROMPT: &str = "✍️ Напишите ваш вопрос по этому разбору.";

pub const FOLLOW_UP_LIMIT: &str = "К одному разбору можно задать не больше двух вопросов. \
Загрузите новые анализы, чтобы продолжить.";

pub const COMPARE_NOT_ENOUGH: &str = "Для сравнения нужно минимум два сохранённых разбора.";

pub const NO_ANALYSES: &str = "У вас пока нет сохранённых разборов. Нажмите «Новый анализ», чтобы начать.";

pub const CANCELED: &str = "Текущий шаг отменён. Возвращаю в меню.";

pub const DB_ERROR: &str = "⚙️ Что-то пошло не так. Попробуйте ещё раз чуть позже.";

pub const PAYMENTS_DISABLED: &str = "Оплата временно недоступна. Попробуйте позже.";

pub const NOT_IN_UPLOAD_STATE: &str = "Чтобы загрузить анализы, нажмите «Новый анализ» или команду /analyze.";

pub const HELP: &str = "Как пользоваться ботом:\n\n\
1. /analyze — пришлите PDF или фото бланка с результатами.\n\
2. Ответьте на несколько вопросов о себе (возраст, пол, жалобы…).\n\
3. Получите структурированный отчёт по показателям.\n\
4. Задайте до двух уточняющих вопросов или сравните с прошлыми разборами.\n\n\
Разборы хранятся 60 дней, не больше трёх последних.\n\
/plan — подписка, /cancel — отменить текущий шаг.";

/// Вопросы анкеты клинического контекста
pub mod questions {
    pub const AGE: &str = "Сколько вам полных лет?";
    pub const SEX: &str = "Укажите пол: мужской или женский.";
    pub const SYMPTOMS: &str = "Что беспокоит? Опишите жалобы (или напишите «нет»).";
    pub const CHRONIC: &str = "Есть ли хронические заболевания? (или «нет»)";
    pub const MEDICATIONS: &str = "Принимаете ли лекарства или добавки? (или «нет»)";
    pub const PREGNANCY: &str = "Есть ли беременность или её планирование? (или «нет»)";
}
